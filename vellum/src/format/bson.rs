use bson::raw::RawBsonRef;
use bson::{Bson, Document, RawDocument};

use crate::error::{DbError, Result};
use crate::format::{DocumentFormat, ParsedSchema, SchemaFormat};
use crate::schema::types::{FieldDef, FieldType, FieldValue};

/// BSON document format.
///
/// Schema descriptors are themselves BSON documents of the shape
/// `{ "name": <schema name>, "fields": { <field>: <def>, ... } }` where a
/// field definition is either a type name string or a document with `type`
/// and optional `required`, `fields` (objects) and `items` (lists) keys.
/// Field declaration order in the descriptor is preserved.
pub struct BsonFormat;

impl DocumentFormat for BsonFormat {
    fn format(&self) -> SchemaFormat {
        SchemaFormat::Bson
    }

    fn parse_descriptor(&self, descriptor: &[u8]) -> Result<ParsedSchema> {
        let doc: Document = bson::from_slice(descriptor)
            .map_err(|e| DbError::SchemaParse(format!("descriptor is not valid BSON: {e}")))?;
        let name = doc
            .get_str("name")
            .map_err(|_| DbError::SchemaParse("descriptor is missing a 'name' string".into()))?
            .to_string();
        if name.is_empty() {
            return Err(DbError::SchemaParse("schema name may not be empty".into()));
        }
        let fields_doc = doc
            .get_document("fields")
            .map_err(|_| DbError::SchemaParse(format!("schema '{name}': missing 'fields' document")))?;
        let fields = parse_fields(fields_doc, "")?;
        if fields.is_empty() {
            return Err(DbError::SchemaParse(format!("schema '{name}': declares no fields")));
        }
        Ok(ParsedSchema { name, fields })
    }

    fn validate(&self, schema: &ParsedSchema, document: &[u8]) -> Result<()> {
        let raw = RawDocument::from_bytes(document)
            .map_err(|e| DbError::SchemaValidation(format!("document is not valid BSON: {e}")))?;
        validate_fields(raw, &schema.fields, "")
    }

    fn extract(&self, document: &[u8], path: &str) -> Result<Option<FieldValue>> {
        let raw = RawDocument::from_bytes(document)
            .map_err(|e| DbError::DatabaseCorrupt(format!("stored document is not valid BSON: {e}")))?;
        let mut current = raw;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let value = current
                .get(segment)
                .map_err(|e| DbError::DatabaseCorrupt(format!("stored document is unreadable at '{path}': {e}")))?;
            let value = match value {
                None => return Ok(None),
                Some(v) => v,
            };
            if segments.peek().is_some() {
                match value {
                    RawBsonRef::Document(d) => current = d,
                    _ => return Ok(None),
                }
            } else {
                return Ok(scalar_of(value));
            }
        }
        Ok(None)
    }
}

// ── Descriptor parsing ──────────────────────────────────────────────────────

fn parse_fields(fields: &Document, prefix: &str) -> Result<Vec<FieldDef>> {
    let mut parsed = Vec::new();
    for (name, decl) in fields.iter() {
        if name.is_empty() || name.contains('.') {
            return Err(DbError::SchemaParse(format!(
                "field name '{name}' may not be empty or contain '.'"
            )));
        }
        parsed.push(parse_field(name, decl, prefix)?);
    }
    Ok(parsed)
}

fn parse_field(name: &str, decl: &Bson, prefix: &str) -> Result<FieldDef> {
    let path = join_path(prefix, name);
    match decl {
        // Short form: "age": "int"
        Bson::String(ty_name) => {
            let ty = field_type(ty_name, &path)?;
            if !ty.is_scalar() {
                return Err(DbError::SchemaParse(format!(
                    "field '{path}': '{ty}' fields need the long form with nested definitions"
                )));
            }
            Ok(FieldDef::scalar(name, ty))
        }
        // Long form: "age": { "type": "int", "required": true }
        Bson::Document(def) => {
            let ty_name = def
                .get_str("type")
                .map_err(|_| DbError::SchemaParse(format!("field '{path}': missing 'type'")))?;
            let ty = field_type(ty_name, &path)?;
            let required = match def.get("required") {
                None => false,
                Some(Bson::Boolean(b)) => *b,
                Some(_) => {
                    return Err(DbError::SchemaParse(format!(
                        "field '{path}': 'required' must be a bool"
                    )))
                }
            };
            let mut children = Vec::new();
            let mut item = None;
            match ty {
                FieldType::Object => {
                    let nested = def.get_document("fields").map_err(|_| {
                        DbError::SchemaParse(format!("field '{path}': object needs a 'fields' document"))
                    })?;
                    children = parse_fields(nested, &path)?;
                    if children.is_empty() {
                        return Err(DbError::SchemaParse(format!(
                            "field '{path}': object declares no fields"
                        )));
                    }
                }
                FieldType::List => {
                    let items = def.get("items").ok_or_else(|| {
                        DbError::SchemaParse(format!("field '{path}': list needs an 'items' definition"))
                    })?;
                    item = Some(Box::new(parse_field("", items, &format!("{path}[]"))?));
                }
                _ => {}
            }
            Ok(FieldDef {
                name: name.to_string(),
                ty,
                required,
                children,
                item,
            })
        }
        _ => Err(DbError::SchemaParse(format!(
            "field '{path}': expected a type name or a definition document"
        ))),
    }
}

fn field_type(name: &str, path: &str) -> Result<FieldType> {
    FieldType::from_name(name)
        .ok_or_else(|| DbError::SchemaParse(format!("field '{path}': unknown type '{name}'")))
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

// ── Validation ──────────────────────────────────────────────────────────────

fn validate_fields(raw: &RawDocument, fields: &[FieldDef], prefix: &str) -> Result<()> {
    for field in fields {
        let path = join_path(prefix, &field.name);
        let value = raw
            .get(&field.name)
            .map_err(|e| DbError::SchemaValidation(format!("field '{path}': {e}")))?;
        match value {
            None | Some(RawBsonRef::Null) => {
                if field.required {
                    return Err(DbError::SchemaValidation(format!(
                        "missing required field '{path}'"
                    )));
                }
            }
            Some(v) => validate_value(v, field, &path)?,
        }
    }
    Ok(())
}

fn validate_value(value: RawBsonRef<'_>, field: &FieldDef, path: &str) -> Result<()> {
    let ok = match field.ty {
        FieldType::Int => matches!(value, RawBsonRef::Int32(_) | RawBsonRef::Int64(_)),
        FieldType::Float => matches!(value, RawBsonRef::Double(_)),
        FieldType::String => matches!(value, RawBsonRef::String(_)),
        FieldType::Bool => matches!(value, RawBsonRef::Boolean(_)),
        FieldType::Binary => matches!(value, RawBsonRef::Binary(_)),
        FieldType::Object => match value {
            RawBsonRef::Document(nested) => {
                return validate_fields(nested, &field.children, path);
            }
            _ => false,
        },
        FieldType::List => matches!(value, RawBsonRef::Array(_)),
    };
    if ok {
        Ok(())
    } else {
        Err(DbError::SchemaValidation(format!(
            "field '{path}': expected {}, got {}",
            field.ty,
            bson_type_name(value)
        )))
    }
}

fn bson_type_name(value: RawBsonRef<'_>) -> &'static str {
    match value {
        RawBsonRef::Double(_) => "double",
        RawBsonRef::String(_) => "string",
        RawBsonRef::Document(_) => "document",
        RawBsonRef::Array(_) => "array",
        RawBsonRef::Binary(_) => "binary",
        RawBsonRef::Boolean(_) => "bool",
        RawBsonRef::Null => "null",
        RawBsonRef::Int32(_) => "int32",
        RawBsonRef::Int64(_) => "int64",
        _ => "an unsupported bson type",
    }
}

fn scalar_of(value: RawBsonRef<'_>) -> Option<FieldValue> {
    match value {
        RawBsonRef::Int32(i) => Some(FieldValue::Int(i64::from(i))),
        RawBsonRef::Int64(i) => Some(FieldValue::Int(i)),
        RawBsonRef::Double(f) => Some(FieldValue::Float(f)),
        RawBsonRef::String(s) => Some(FieldValue::Str(s.to_string())),
        RawBsonRef::Boolean(b) => Some(FieldValue::Bool(b)),
        RawBsonRef::Binary(b) => Some(FieldValue::Bytes(b.bytes.to_vec())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use bson::spec::BinarySubtype;

    fn descriptor(fields: Document) -> Vec<u8> {
        bson::to_vec(&doc! { "name": "test", "fields": fields }).unwrap()
    }

    fn parse(fields: Document) -> Result<ParsedSchema> {
        BsonFormat.parse_descriptor(&descriptor(fields))
    }

    #[test]
    fn test_parse_short_and_long_form() {
        let schema = parse(doc! {
            "name": { "type": "string", "required": true },
            "age": "int",
            "score": "float",
        })
        .unwrap();
        assert_eq!(schema.name, "test");
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.fields[0].name, "name");
        assert!(schema.fields[0].required);
        assert_eq!(schema.fields[1].ty, FieldType::Int);
        assert!(!schema.fields[1].required);
    }

    #[test]
    fn test_parse_preserves_declaration_order() {
        let schema = parse(doc! {
            "zulu": "string",
            "alpha": "int",
            "mike": "bool",
        })
        .unwrap();
        let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["zulu", "alpha", "mike"]);
    }

    #[test]
    fn test_parse_nested_object_and_list() {
        let schema = parse(doc! {
            "played_by": {
                "type": "object",
                "fields": { "name": "string", "date_of_birth": "string" }
            },
            "aliases": { "type": "list", "items": "string" },
        })
        .unwrap();
        assert_eq!(schema.fields[0].ty, FieldType::Object);
        assert_eq!(schema.fields[0].children.len(), 2);
        assert_eq!(schema.fields[1].ty, FieldType::List);
        assert_eq!(schema.fields[1].item.as_ref().unwrap().ty, FieldType::String);
    }

    #[test]
    fn test_parse_rejects_bad_descriptors() {
        assert!(matches!(
            parse(doc! { "age": "decimal" }),
            Err(DbError::SchemaParse(_))
        ));
        assert!(matches!(
            parse(doc! { "profile": "object" }),
            Err(DbError::SchemaParse(_))
        ));
        assert!(matches!(
            parse(doc! { "a.b": "int" }),
            Err(DbError::SchemaParse(_))
        ));
        assert!(matches!(parse(doc! {}), Err(DbError::SchemaParse(_))));
        assert!(matches!(
            BsonFormat.parse_descriptor(b"not bson"),
            Err(DbError::SchemaParse(_))
        ));
    }

    fn character_schema() -> ParsedSchema {
        parse(doc! {
            "name": { "type": "string", "required": true },
            "age": "int",
            "rating": "float",
            "alive": "bool",
            "portrait": "binary",
            "played_by": {
                "type": "object",
                "fields": { "name": "string", "place_of_birth": "string" }
            },
        })
        .unwrap()
    }

    #[test]
    fn test_validate_accepts_conforming_document() {
        let schema = character_schema();
        let doc = bson::to_vec(&doc! {
            "name": "Tyrion",
            "age": 39,
            "rating": 9.9,
            "alive": true,
            "played_by": { "name": "Peter Dinklage" },
        })
        .unwrap();
        assert!(BsonFormat.validate(&schema, &doc).is_ok());
    }

    #[test]
    fn test_validate_reports_missing_required_field() {
        let schema = character_schema();
        let doc = bson::to_vec(&doc! { "age": 39 }).unwrap();
        let err = BsonFormat.validate(&schema, &doc).unwrap_err();
        assert!(err.to_string().contains("required field 'name'"));
    }

    #[test]
    fn test_validate_reports_nested_type_mismatch() {
        let schema = character_schema();
        let doc = bson::to_vec(&doc! {
            "name": "Tyrion",
            "played_by": { "name": 42 },
        })
        .unwrap();
        let err = BsonFormat.validate(&schema, &doc).unwrap_err();
        assert!(err.to_string().contains("played_by.name"));
    }

    #[test]
    fn test_validate_allows_null_for_optional_and_extra_fields() {
        let schema = character_schema();
        let doc = bson::to_vec(&doc! {
            "name": "Jon Snow",
            "age": Bson::Null,
            "house": "Stark",
        })
        .unwrap();
        assert!(BsonFormat.validate(&schema, &doc).is_ok());
    }

    #[test]
    fn test_validate_rejects_non_bson_bytes() {
        let schema = character_schema();
        assert!(matches!(
            BsonFormat.validate(&schema, &[1, 2, 3]),
            Err(DbError::SchemaValidation(_))
        ));
    }

    #[test]
    fn test_extract_walks_nested_paths() {
        let doc = bson::to_vec(&doc! {
            "name": "Tyrion",
            "age": 39,
            "played_by": { "name": "Peter Dinklage" },
        })
        .unwrap();
        assert_eq!(
            BsonFormat.extract(&doc, "played_by.name").unwrap(),
            Some(FieldValue::Str("Peter Dinklage".into()))
        );
        assert_eq!(
            BsonFormat.extract(&doc, "age").unwrap(),
            Some(FieldValue::Int(39))
        );
        assert_eq!(BsonFormat.extract(&doc, "house").unwrap(), None);
        assert_eq!(BsonFormat.extract(&doc, "played_by.place_of_birth").unwrap(), None);
        assert_eq!(BsonFormat.extract(&doc, "age.nested").unwrap(), None);
    }

    #[test]
    fn test_extract_converts_scalar_representations() {
        let doc = bson::to_vec(&doc! {
            "small": 7_i32,
            "large": 7_000_000_000_i64,
            "ratio": 0.5,
            "flag": false,
            "blob": bson::Binary { subtype: BinarySubtype::Generic, bytes: vec![0xde, 0xad] },
        })
        .unwrap();
        assert_eq!(BsonFormat.extract(&doc, "small").unwrap(), Some(FieldValue::Int(7)));
        assert_eq!(
            BsonFormat.extract(&doc, "large").unwrap(),
            Some(FieldValue::Int(7_000_000_000))
        );
        assert_eq!(
            BsonFormat.extract(&doc, "ratio").unwrap(),
            Some(FieldValue::Float(0.5))
        );
        assert_eq!(
            BsonFormat.extract(&doc, "flag").unwrap(),
            Some(FieldValue::Bool(false))
        );
        assert_eq!(
            BsonFormat.extract(&doc, "blob").unwrap(),
            Some(FieldValue::Bytes(vec![0xde, 0xad]))
        );
    }
}
