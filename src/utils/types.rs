use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::{BenchError, BenchResult, ConnectorError};

/// Dataset a benchmark query runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum Dataset {
    Census,
    Ecommerce,
}

/// Data source a benchmark query is executed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum Backend {
    FlatFile,
    Relational,
    Document,
}

/// Query shape, escalating in grouping cardinality and aggregation breadth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::Census, Dataset::Ecommerce];

    /// Label stored in the query log
    pub fn label(&self) -> &'static str {
        match self {
            Dataset::Census => "Census Data",
            Dataset::Ecommerce => "E-commerce Data",
        }
    }
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::FlatFile, Backend::Relational, Backend::Document];

    /// Label stored in the query log
    pub fn label(&self) -> &'static str {
        match self {
            Backend::FlatFile => "Flat File",
            Backend::Relational => "PostgreSQL",
            Backend::Document => "MongoDB",
        }
    }
}

impl Complexity {
    pub const ALL: [Complexity; 3] = [Complexity::Simple, Complexity::Moderate, Complexity::Complex];

    pub fn label(&self) -> &'static str {
        match self {
            Complexity::Simple => "Simple",
            Complexity::Moderate => "Moderate",
            Complexity::Complex => "Complex",
        }
    }
}

macro_rules! label_conversions {
    ($ty:ident, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $ty {
            type Err = BenchError;

            /// Accepts the log label as well as the command-line name
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| {
                        v.label().eq_ignore_ascii_case(s)
                            || v.to_possible_value()
                                .map(|p| p.matches(s, true))
                                .unwrap_or(false)
                    })
                    .ok_or_else(|| BenchError::Internal(format!("Unknown {}: {}", $what, s)))
            }
        }

        // Serialized as the log label so JSON output matches the stored records
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

label_conversions!(Dataset, "dataset");
label_conversions!(Backend, "backend");
label_conversions!(Complexity, "complexity");

/// Named parameter slot referenced by query descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSlot {
    AgeMin,
    AgeMax,
    IncomeThreshold,
    SexOptions,
    PriceMin,
    PriceMax,
    Categories,
}

impl ParamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            ParamSlot::AgeMin => "age_min",
            ParamSlot::AgeMax => "age_max",
            ParamSlot::IncomeThreshold => "income_threshold",
            ParamSlot::SexOptions => "sex_options",
            ParamSlot::PriceMin => "price_min",
            ParamSlot::PriceMax => "price_max",
            ParamSlot::Categories => "categories",
        }
    }
}

/// A bound parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Integer(i64),
    Float(f64),
    IntegerList(Vec<i64>),
    TextList(Vec<String>),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Integer(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Integer(i) => serde_json::json!(i),
            ParamValue::Float(f) => serde_json::json!(f),
            ParamValue::IntegerList(list) => serde_json::json!(list),
            ParamValue::TextList(list) => serde_json::json!(list),
        }
    }
}

/// Census filter controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CensusFilters {
    pub age_min: i64,
    pub age_max: i64,
    pub income_threshold: i64,
    pub sex_options: Vec<i64>,
}

/// E-commerce filter controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcommerceFilters {
    pub price_min: f64,
    pub price_max: f64,
    pub categories: Vec<String>,
}

/// The five product categories present in the e-commerce data
pub const ECOMMERCE_CATEGORIES: [&str; 5] = ["Electronics", "Books", "Clothing", "Home", "Toys"];

impl Default for CensusFilters {
    fn default() -> Self {
        Self {
            age_min: 0,
            age_max: 100,
            income_threshold: 0,
            sex_options: vec![0, 1],
        }
    }
}

impl Default for EcommerceFilters {
    fn default() -> Self {
        Self {
            price_min: 0.0,
            price_max: 1000.0,
            categories: vec!["Electronics".to_string(), "Books".to_string()],
        }
    }
}

/// Per-invocation filter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterParams {
    Census(CensusFilters),
    Ecommerce(EcommerceFilters),
}

impl FilterParams {
    /// Default dashboard filters for a dataset
    pub fn default_for(dataset: Dataset) -> Self {
        match dataset {
            Dataset::Census => FilterParams::Census(CensusFilters::default()),
            Dataset::Ecommerce => FilterParams::Ecommerce(EcommerceFilters::default()),
        }
    }

    pub fn dataset(&self) -> Dataset {
        match self {
            FilterParams::Census(_) => Dataset::Census,
            FilterParams::Ecommerce(_) => Dataset::Ecommerce,
        }
    }

    /// Look up the value for a slot. Only the type is checked.
    pub fn bind(&self, slot: ParamSlot) -> BenchResult<ParamValue> {
        let value = match (self, slot) {
            (FilterParams::Census(c), ParamSlot::AgeMin) => ParamValue::Integer(c.age_min),
            (FilterParams::Census(c), ParamSlot::AgeMax) => ParamValue::Integer(c.age_max),
            (FilterParams::Census(c), ParamSlot::IncomeThreshold) => ParamValue::Integer(c.income_threshold),
            (FilterParams::Census(c), ParamSlot::SexOptions) => ParamValue::IntegerList(c.sex_options.clone()),
            (FilterParams::Ecommerce(e), ParamSlot::PriceMin) => ParamValue::Float(e.price_min),
            (FilterParams::Ecommerce(e), ParamSlot::PriceMax) => ParamValue::Float(e.price_max),
            (FilterParams::Ecommerce(e), ParamSlot::Categories) => ParamValue::TextList(e.categories.clone()),
            _ => {
                return Err(ConnectorError::InvalidParameters(format!(
                    "parameter '{}' is not available for {} filters",
                    slot.name(),
                    self.dataset()
                ))
                .into())
            }
        };
        Ok(value)
    }
}

/// Metadata for result columns
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnMetadata {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable: true,
        }
    }
}

/// Supported data types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataType {
    Text,
    Integer,
    Float,
    Boolean,
    Json,
}

/// Individual cell values
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Json(String),
    Null,
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Text(_) | Value::Null => DataType::Text,
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::Boolean(_) => DataType::Boolean,
            Value::Json(_) => DataType::Json,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Text(n.to_string())
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::Json(json.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Json(j) => serde_json::from_str(j).unwrap_or_else(|_| serde_json::Value::String(j.clone())),
            Value::Null => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{:.2}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Json(j) => f.write_str(j),
            Value::Null => f.write_str("NULL"),
        }
    }
}

/// A row of data in a result table
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

/// Tabular result of one executor call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<Row>,
}

impl ResultTable {
    pub fn new(columns: Vec<ColumnMetadata>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// All values of a named column, in row order
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.get(index).unwrap_or(&Value::Null)).collect())
    }

    /// Rows as JSON objects keyed by column name
    pub fn to_json_rows(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.values.iter())
                    .map(|(col, value)| (col.name.clone(), value.to_json()))
                    .collect()
            })
            .collect()
    }
}

/// A timing record to be appended to the query log
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub data_source: Backend,
    pub query_complexity: Complexity,
    pub dataset: Dataset,
    /// Seconds
    pub duration: f64,
}

/// A persisted query log row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryLogRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub data_source: Backend,
    pub query_complexity: Complexity,
    pub dataset: Dataset,
    pub duration: f64,
}

impl QueryLogRecord {
    pub fn duration_ms(&self) -> f64 {
        self.duration * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip_through_from_str() {
        for backend in Backend::ALL {
            assert_eq!(backend.label().parse::<Backend>().unwrap(), backend);
        }
        assert_eq!("flat-file".parse::<Backend>().unwrap(), Backend::FlatFile);
        assert_eq!("E-commerce Data".parse::<Dataset>().unwrap(), Dataset::Ecommerce);
        assert_eq!("complex".parse::<Complexity>().unwrap(), Complexity::Complex);
        assert!("Oracle".parse::<Backend>().is_err());
    }

    #[test]
    fn test_enums_serialize_as_labels() {
        assert_eq!(serde_json::to_value(Backend::FlatFile).unwrap(), serde_json::json!("Flat File"));
        assert_eq!(serde_json::to_value(Dataset::Ecommerce).unwrap(), serde_json::json!("E-commerce Data"));
        assert_eq!(serde_json::to_value(Complexity::Moderate).unwrap(), serde_json::json!("Moderate"));

        let backend: Backend = serde_json::from_value(serde_json::json!("PostgreSQL")).unwrap();
        assert_eq!(backend, Backend::Relational);
        let dataset: Dataset = serde_json::from_value(serde_json::json!("census")).unwrap();
        assert_eq!(dataset, Dataset::Census);
    }

    #[test]
    fn test_filter_bind_checks_slot_type() {
        let census = FilterParams::Census(CensusFilters::default());
        assert_eq!(census.bind(ParamSlot::AgeMax).unwrap(), ParamValue::Integer(100));
        assert_eq!(census.bind(ParamSlot::SexOptions).unwrap(), ParamValue::IntegerList(vec![0, 1]));

        let err = census.bind(ParamSlot::Categories).unwrap_err();
        assert!(matches!(err, BenchError::Connector(ConnectorError::InvalidParameters(_))));
    }

    #[test]
    fn test_value_from_json() {
        assert_eq!(Value::from_json(&serde_json::json!(3)), Value::Integer(3));
        assert_eq!(Value::from_json(&serde_json::json!(2.5)), Value::Float(2.5));
        assert_eq!(Value::from_json(&serde_json::json!("Red")), Value::Text("Red".to_string()));
        match Value::from_json(&serde_json::json!({"iSex": 1})) {
            Value::Json(j) => assert_eq!(j, r#"{"iSex":1}"#),
            other => panic!("Expected json value, got {:?}", other),
        }
    }

    #[test]
    fn test_result_table_accessors() {
        let table = ResultTable::new(
            vec![ColumnMetadata::new("iSex", DataType::Integer), ColumnMetadata::new("count", DataType::Integer)],
            vec![
                Row::new(vec![Value::Integer(0), Value::Integer(4)]),
                Row::new(vec![Value::Integer(1), Value::Integer(6)]),
            ],
        );

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_index("count"), Some(1));
        let counts: Vec<i64> = table.column_values("count").unwrap().iter().filter_map(|v| v.as_i64()).collect();
        assert_eq!(counts, vec![4, 6]);
        assert_eq!(table.to_json_rows()[1]["iSex"], serde_json::json!(1));
    }
}
