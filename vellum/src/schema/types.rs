use std::cmp::Ordering;

// ── Field types ─────────────────────────────────────────────────────────────

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    String,
    Bool,
    Binary,
    Object,
    List,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Bool => "bool",
            FieldType::Binary => "binary",
            FieldType::Object => "object",
            FieldType::List => "list",
        }
    }

    pub fn from_name(name: &str) -> Option<FieldType> {
        match name {
            "int" => Some(FieldType::Int),
            "float" => Some(FieldType::Float),
            "string" => Some(FieldType::String),
            "bool" => Some(FieldType::Bool),
            "binary" => Some(FieldType::Binary),
            "object" => Some(FieldType::Object),
            "list" => Some(FieldType::List),
            _ => None,
        }
    }

    /// Scalar types carry a single value and can appear in projections.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FieldType::Object | FieldType::List)
    }

    /// Orderable scalars can back an ordered index and appear in predicates.
    /// Binary is a scalar but has no defined ordering.
    pub fn is_orderable(&self) -> bool {
        matches!(
            self,
            FieldType::Int | FieldType::Float | FieldType::String | FieldType::Bool
        )
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Field definitions ───────────────────────────────────────────────────────

/// One field in a parsed schema descriptor. Objects carry their children in
/// declaration order; lists carry a single item definition.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
    pub children: Vec<FieldDef>,
    pub item: Option<Box<FieldDef>>,
}

impl FieldDef {
    pub fn scalar(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            children: Vec::new(),
            item: None,
        }
    }
}

// ── Field values ────────────────────────────────────────────────────────────

/// A scalar value extracted from a document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Str(_) => "string",
            FieldValue::Bool(_) => "bool",
            FieldValue::Bytes(_) => "binary",
        }
    }

    /// Converts to an index key. Returns `None` for values with no defined
    /// ordering: binary blobs and NaN floats. Such values are skipped when
    /// indexing, which matches their behavior under predicates. Negative
    /// zero folds into positive zero: predicates compare the two as equal,
    /// so their keys must collide.
    pub fn as_key(&self) -> Option<FieldKey> {
        match self {
            FieldValue::Int(i) => Some(FieldKey::Int(*i)),
            FieldValue::Float(f) if f.is_nan() => None,
            FieldValue::Float(f) if *f == 0.0 => Some(FieldKey::Float(0.0)),
            FieldValue::Float(f) => Some(FieldKey::Float(*f)),
            FieldValue::Str(s) => Some(FieldKey::Str(s.clone())),
            FieldValue::Bool(b) => Some(FieldKey::Bool(*b)),
            FieldValue::Bytes(_) => None,
        }
    }
}

// ── Index keys ──────────────────────────────────────────────────────────────

/// Orderable key stored in an index. The ordering is total: booleans sort
/// before numbers, numbers before strings, and int/float compare by numeric
/// value so a float predicate bound works against an int index.
///
/// Keys are built by `FieldValue::as_key`, which keeps NaN out and folds
/// negative zero into positive zero; on the keys that remain, `total_cmp`
/// agrees with plain numeric comparison.
#[derive(Debug, Clone)]
pub enum FieldKey {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldKey {
    fn rank(&self) -> u8 {
        match self {
            FieldKey::Bool(_) => 0,
            FieldKey::Int(_) | FieldKey::Float(_) => 1,
            FieldKey::Str(_) => 2,
        }
    }
}

impl PartialEq for FieldKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldKey {}

impl PartialOrd for FieldKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldKey {
    fn cmp(&self, other: &Self) -> Ordering {
        use FieldKey::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Int(a), Float(b)) => cmp_i64_f64(*a, *b),
            (Float(a), Int(b)) => cmp_i64_f64(*b, *a).reverse(),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Str(a), Str(b)) => a.as_bytes().cmp(b.as_bytes()),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

/// Exact comparison of an i64 against an f64, without the precision loss of
/// casting either side. The float's floor is exactly representable as i64
/// once the magnitude guards have excluded values outside the i64 range.
pub(crate) fn cmp_i64_f64(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        // NaN never enters an index; ordering it greatest keeps cmp total.
        return Ordering::Less;
    }
    // 2^63 as f64 is exact; anything at or above it exceeds every i64.
    if f >= 9_223_372_036_854_775_808.0 {
        return Ordering::Less;
    }
    if f < -9_223_372_036_854_775_808.0 {
        return Ordering::Greater;
    }
    let floor = f.floor();
    let floor_int = floor as i64;
    match i.cmp(&floor_int) {
        Ordering::Equal => {
            if f > floor {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        }
        other => other,
    }
}

/// Compares a document value against a predicate literal. Returns `None`
/// when the pair has no defined ordering (the predicate is then false).
pub(crate) fn compare_values(doc: &FieldValue, literal: &FieldValue) -> Option<Ordering> {
    use FieldValue::*;
    match (doc, literal) {
        (Int(a), Int(b)) => Some(a.cmp(b)),
        (Int(a), Float(b)) => Some(cmp_i64_f64(*a, *b)),
        (Float(a), Int(b)) => Some(cmp_i64_f64(*b, *a).reverse()),
        (Float(a), Float(b)) => a.partial_cmp(b),
        (Str(a), Str(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (Bool(a), Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_keys_order_numerically() {
        let mut keys = vec![FieldKey::Int(51), FieldKey::Int(-3), FieldKey::Int(21)];
        keys.sort();
        assert_eq!(
            keys,
            vec![FieldKey::Int(-3), FieldKey::Int(21), FieldKey::Int(51)]
        );
    }

    #[test]
    fn test_string_keys_order_bytewise() {
        let mut keys = vec![
            FieldKey::Str("Stark".into()),
            FieldKey::Str("Baelish".into()),
            FieldKey::Str("Lannister".into()),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                FieldKey::Str("Baelish".into()),
                FieldKey::Str("Lannister".into()),
                FieldKey::Str("Stark".into()),
            ]
        );
    }

    #[test]
    fn test_cross_numeric_comparison_is_exact() {
        assert_eq!(FieldKey::Int(3).cmp(&FieldKey::Float(3.0)), Ordering::Equal);
        assert_eq!(FieldKey::Int(3).cmp(&FieldKey::Float(3.5)), Ordering::Less);
        assert_eq!(FieldKey::Int(4).cmp(&FieldKey::Float(3.5)), Ordering::Greater);
        assert_eq!(
            FieldKey::Float(2.5).cmp(&FieldKey::Int(2)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_cross_numeric_comparison_at_i64_bounds() {
        // i64::MAX is not representable as f64; 2^63 rounds up past it.
        assert_eq!(
            cmp_i64_f64(i64::MAX, 9_223_372_036_854_775_808.0),
            Ordering::Less
        );
        assert_eq!(cmp_i64_f64(i64::MIN, -9_223_372_036_854_775_808.0), Ordering::Equal);
        assert_eq!(cmp_i64_f64(0, f64::INFINITY), Ordering::Less);
        assert_eq!(cmp_i64_f64(0, f64::NEG_INFINITY), Ordering::Greater);
    }

    #[test]
    fn test_type_ranks_are_disjoint() {
        assert!(FieldKey::Bool(true) < FieldKey::Int(i64::MIN));
        assert!(FieldKey::Int(i64::MAX) < FieldKey::Str(String::new()));
        assert!(FieldKey::Float(f64::INFINITY) < FieldKey::Str(String::new()));
    }

    #[test]
    fn test_nan_and_bytes_produce_no_key() {
        assert_eq!(FieldValue::Float(f64::NAN).as_key(), None);
        assert_eq!(FieldValue::Bytes(vec![1]).as_key(), None);
        assert_eq!(
            FieldValue::Float(1.5).as_key(),
            Some(FieldKey::Float(1.5))
        );
    }

    #[test]
    fn test_signed_zero_folds_into_one_key() {
        // total_cmp splits -0.0 from 0.0, so both spellings must map to the
        // same key or an equality lookup misses one of them.
        assert_eq!(FieldValue::Float(-0.0).as_key(), Some(FieldKey::Float(0.0)));
        assert_eq!(
            FieldValue::Float(-0.0).as_key(),
            FieldValue::Float(0.0).as_key()
        );
        assert_eq!(
            compare_values(&FieldValue::Float(-0.0), &FieldValue::Float(0.0)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_compare_values_mixed_numeric() {
        assert_eq!(
            compare_values(&FieldValue::Int(21), &FieldValue::Float(21.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            compare_values(&FieldValue::Float(38.5), &FieldValue::Int(39)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_values(&FieldValue::Str("a".into()), &FieldValue::Int(1)),
            None
        );
        assert_eq!(
            compare_values(&FieldValue::Float(f64::NAN), &FieldValue::Float(1.0)),
            None
        );
    }

    #[test]
    fn test_field_type_names_round_trip() {
        for ty in [
            FieldType::Int,
            FieldType::Float,
            FieldType::String,
            FieldType::Bool,
            FieldType::Binary,
            FieldType::Object,
            FieldType::List,
        ] {
            assert_eq!(FieldType::from_name(ty.name()), Some(ty));
        }
        assert_eq!(FieldType::from_name("decimal"), None);
    }
}
