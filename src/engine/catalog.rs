//! Lookup table from (dataset, backend, complexity) to a query descriptor.
//!
//! Every combination of the three enums has exactly one entry: either a
//! descriptor or an explicit `Unsupported` marker. `QueryCatalog::from_entries`
//! refuses to build a catalog with gaps or duplicates.

use std::collections::HashMap;

use crate::utils::{
    error::{BenchResult, CatalogError},
    types::{Backend, Complexity, Dataset, ParamSlot},
};

/// Catalog lookup key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogKey {
    pub dataset: Dataset,
    pub backend: Backend,
    pub complexity: Complexity,
}

impl CatalogKey {
    pub fn new(dataset: Dataset, backend: Backend, complexity: Complexity) -> Self {
        Self { dataset, backend, complexity }
    }

    /// Every key of the enum product
    pub fn all() -> Vec<CatalogKey> {
        let mut keys = Vec::new();
        for dataset in Dataset::ALL {
            for backend in Backend::ALL {
                for complexity in Complexity::ALL {
                    keys.push(CatalogKey::new(dataset, backend, complexity));
                }
            }
        }
        keys
    }
}

/// Parameterized SQL statement; `$n` placeholders bind `params[n - 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub text: String,
    pub params: Vec<ParamSlot>,
}

/// Comparison applied by a filter predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gte,
    Lte,
    In,
}

/// `field <comparison> value-of(slot)`; dotted fields address nested documents
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPredicate {
    pub field: String,
    pub comparison: Comparison,
    pub slot: ParamSlot,
}

/// Aggregate computed per group
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Count { alias: String },
    Mean { field: String, alias: String },
}

impl Aggregate {
    pub fn alias(&self) -> &str {
        match self {
            Aggregate::Count { alias } | Aggregate::Mean { alias, .. } => alias,
        }
    }
}

/// Grouping key: `alias` names the output, `field` is the source path
#[derive(Debug, Clone, PartialEq)]
pub struct GroupKey {
    pub alias: String,
    pub field: String,
}

/// In-memory filter/group/aggregate plan for tabular files
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub source: String,
    pub predicates: Vec<FieldPredicate>,
    pub group_by: Vec<String>,
    pub aggregates: Vec<Aggregate>,
}

/// Aggregation pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStage {
    Match(Vec<FieldPredicate>),
    /// Flatten a repeated sub-document into one document per element
    Unwind(String),
    Group { keys: Vec<GroupKey>, aggregates: Vec<Aggregate> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub collection: String,
    pub stages: Vec<PipelineStage>,
}

/// Backend-specific form of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySpec {
    Sql(SqlStatement),
    Frame(FramePlan),
    Pipeline(Pipeline),
}

/// Immutable query definition for one catalog key
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub dataset: Dataset,
    pub backend: Backend,
    pub complexity: Complexity,
    pub query: QuerySpec,
}

impl QueryDescriptor {
    pub fn key(&self) -> CatalogKey {
        CatalogKey::new(self.dataset, self.backend, self.complexity)
    }

    /// Parameter slots the descriptor reads, in binding order
    pub fn param_slots(&self) -> Vec<ParamSlot> {
        let mut slots: Vec<ParamSlot> = match &self.query {
            QuerySpec::Sql(sql) => return sql.params.clone(),
            QuerySpec::Frame(plan) => plan.predicates.iter().map(|p| p.slot).collect(),
            QuerySpec::Pipeline(pipeline) => pipeline
                .stages
                .iter()
                .filter_map(|stage| match stage {
                    PipelineStage::Match(preds) => Some(preds.iter().map(|p| p.slot)),
                    _ => None,
                })
                .flatten()
                .collect(),
        };
        slots.dedup();
        slots
    }

    /// Short human-readable rendering used by the `catalog` command
    pub fn summary(&self) -> String {
        match &self.query {
            QuerySpec::Sql(sql) => sql.text.split_whitespace().collect::<Vec<_>>().join(" "),
            QuerySpec::Frame(plan) => format!(
                "scan {} | filter {} | group by [{}] | {}",
                plan.source,
                plan.predicates.iter().map(|p| p.field.as_str()).collect::<Vec<_>>().join(", "),
                plan.group_by.join(", "),
                plan.aggregates.iter().map(|a| a.alias()).collect::<Vec<_>>().join(", ")
            ),
            QuerySpec::Pipeline(pipeline) => {
                let stages: Vec<String> = pipeline
                    .stages
                    .iter()
                    .map(|stage| match stage {
                        PipelineStage::Match(_) => "$match".to_string(),
                        PipelineStage::Unwind(path) => format!("$unwind {}", path),
                        PipelineStage::Group { keys, .. } => format!(
                            "$group [{}]",
                            keys.iter().map(|k| k.alias.as_str()).collect::<Vec<_>>().join(", ")
                        ),
                    })
                    .collect();
                format!("{}: {}", pipeline.collection, stages.join(" -> "))
            }
        }
    }
}

/// A catalog slot: a descriptor, or an explicit refusal
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEntry {
    Query(QueryDescriptor),
    Unsupported(String),
}

/// Canonical output layout for a (dataset, tier) pair, shared by all backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierShape {
    pub keys: &'static [&'static str],
    pub measures: &'static [&'static str],
}

pub fn tier_shape(dataset: Dataset, complexity: Complexity) -> TierShape {
    match (dataset, complexity) {
        (Dataset::Census, Complexity::Simple) => TierShape { keys: &["iSex"], measures: &["count"] },
        (Dataset::Census, Complexity::Moderate) => TierShape { keys: &["iSex"], measures: &["avg_income"] },
        (Dataset::Census, Complexity::Complex) => TierShape {
            keys: &["iSex", "iMarital"],
            measures: &["mean", "count"],
        },
        (Dataset::Ecommerce, Complexity::Simple) => TierShape {
            keys: &["category"],
            measures: &["average_price"],
        },
        (Dataset::Ecommerce, Complexity::Moderate) => TierShape {
            keys: &["category"],
            measures: &["average_rating"],
        },
        (Dataset::Ecommerce, Complexity::Complex) => TierShape {
            keys: &["category", "color"],
            measures: &["average_rating", "average_price"],
        },
    }
}

/// Total mapping from catalog keys to entries
#[derive(Debug, Clone)]
pub struct QueryCatalog {
    entries: HashMap<CatalogKey, CatalogEntry>,
}

impl QueryCatalog {
    /// Build a catalog, failing unless every key appears exactly once
    pub fn from_entries(entries: Vec<(CatalogKey, CatalogEntry)>) -> BenchResult<Self> {
        let mut map = HashMap::new();
        for (key, entry) in entries {
            if let CatalogEntry::Query(descriptor) = &entry {
                if descriptor.key() != key {
                    return Err(CatalogError::Incomplete(format!(
                        "descriptor for {:?} registered under {:?}",
                        descriptor.key(),
                        key
                    ))
                    .into());
                }
            }
            if map.insert(key, entry).is_some() {
                return Err(CatalogError::Duplicate(format!("{:?}", key)).into());
            }
        }

        let missing: Vec<String> = CatalogKey::all()
            .into_iter()
            .filter(|key| !map.contains_key(key))
            .map(|key| format!("{}/{}/{}", key.dataset, key.backend, key.complexity))
            .collect();
        if !missing.is_empty() {
            return Err(CatalogError::Incomplete(format!("no entry for {}", missing.join(", "))).into());
        }

        Ok(Self { entries: map })
    }

    /// The benchmark's built-in catalog
    pub fn standard() -> BenchResult<Self> {
        let mut entries = Vec::new();
        for dataset in Dataset::ALL {
            for complexity in Complexity::ALL {
                for backend in Backend::ALL {
                    let key = CatalogKey::new(dataset, backend, complexity);
                    let query = match (dataset, backend) {
                        (Dataset::Census, Backend::FlatFile) => QuerySpec::Frame(census_frame(complexity)),
                        (Dataset::Census, Backend::Relational) => QuerySpec::Sql(census_sql(complexity)),
                        (Dataset::Census, Backend::Document) => QuerySpec::Pipeline(census_pipeline(complexity)),
                        (Dataset::Ecommerce, Backend::FlatFile) => {
                            entries.push((
                                key,
                                CatalogEntry::Unsupported("no flat file exists for the e-commerce dataset".to_string()),
                            ));
                            continue;
                        }
                        (Dataset::Ecommerce, Backend::Relational) => QuerySpec::Sql(ecommerce_sql(complexity)),
                        (Dataset::Ecommerce, Backend::Document) => {
                            QuerySpec::Pipeline(ecommerce_pipeline(complexity))
                        }
                    };
                    entries.push((
                        key,
                        CatalogEntry::Query(QueryDescriptor { dataset, backend, complexity, query }),
                    ));
                }
            }
        }
        Self::from_entries(entries)
    }

    pub fn resolve(&self, dataset: Dataset, backend: Backend, complexity: Complexity) -> BenchResult<&QueryDescriptor> {
        let key = CatalogKey::new(dataset, backend, complexity);
        match self.entries.get(&key) {
            Some(CatalogEntry::Query(descriptor)) => Ok(descriptor),
            Some(CatalogEntry::Unsupported(_)) | None => Err(CatalogError::Unsupported {
                dataset,
                backend,
                complexity,
            }
            .into()),
        }
    }

    pub fn entry(&self, key: &CatalogKey) -> Option<&CatalogEntry> {
        self.entries.get(key)
    }

    /// All entries in key order
    pub fn entries(&self) -> Vec<(CatalogKey, &CatalogEntry)> {
        let mut entries: Vec<(CatalogKey, &CatalogEntry)> = self.entries.iter().map(|(k, v)| (*k, v)).collect();
        entries.sort_by_key(|(k, _)| *k);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn predicate(field: &str, comparison: Comparison, slot: ParamSlot) -> FieldPredicate {
    FieldPredicate {
        field: field.to_string(),
        comparison,
        slot,
    }
}

fn count(alias: &str) -> Aggregate {
    Aggregate::Count { alias: alias.to_string() }
}

fn mean(field: &str, alias: &str) -> Aggregate {
    Aggregate::Mean {
        field: field.to_string(),
        alias: alias.to_string(),
    }
}

fn key(alias: &str, field: &str) -> GroupKey {
    GroupKey {
        alias: alias.to_string(),
        field: field.to_string(),
    }
}

fn census_predicates() -> Vec<FieldPredicate> {
    vec![
        predicate("dAge", Comparison::Gte, ParamSlot::AgeMin),
        predicate("dAge", Comparison::Lte, ParamSlot::AgeMax),
        predicate("dIncome1", Comparison::Gte, ParamSlot::IncomeThreshold),
        predicate("iSex", Comparison::In, ParamSlot::SexOptions),
    ]
}

fn ecommerce_predicates(complexity: Complexity) -> Vec<FieldPredicate> {
    let mut preds = vec![
        predicate("price", Comparison::Gte, ParamSlot::PriceMin),
        predicate("price", Comparison::Lte, ParamSlot::PriceMax),
    ];
    if complexity != Complexity::Simple {
        preds.push(predicate("category", Comparison::In, ParamSlot::Categories));
    }
    preds
}

fn census_aggregates(complexity: Complexity) -> Vec<Aggregate> {
    match complexity {
        Complexity::Simple => vec![count("count")],
        Complexity::Moderate => vec![mean("dIncome1", "avg_income")],
        Complexity::Complex => vec![mean("dIncome1", "mean"), count("count")],
    }
}

fn census_frame(complexity: Complexity) -> FramePlan {
    FramePlan {
        source: "census_data".to_string(),
        predicates: census_predicates(),
        group_by: tier_shape(Dataset::Census, complexity)
            .keys
            .iter()
            .map(|k| k.to_string())
            .collect(),
        aggregates: census_aggregates(complexity),
    }
}

fn census_pipeline(complexity: Complexity) -> Pipeline {
    let keys = tier_shape(Dataset::Census, complexity)
        .keys
        .iter()
        .map(|k| key(k, k))
        .collect();
    Pipeline {
        collection: "census_data".to_string(),
        stages: vec![
            PipelineStage::Match(census_predicates()),
            PipelineStage::Group {
                keys,
                aggregates: census_aggregates(complexity),
            },
        ],
    }
}

fn ecommerce_pipeline(complexity: Complexity) -> Pipeline {
    let mut stages = vec![PipelineStage::Match(ecommerce_predicates(complexity))];
    match complexity {
        Complexity::Simple => stages.push(PipelineStage::Group {
            keys: vec![key("category", "category")],
            aggregates: vec![mean("price", "average_price")],
        }),
        Complexity::Moderate => {
            stages.push(PipelineStage::Unwind("reviews".to_string()));
            stages.push(PipelineStage::Group {
                keys: vec![key("category", "category")],
                aggregates: vec![mean("reviews.rating", "average_rating")],
            });
        }
        Complexity::Complex => {
            stages.push(PipelineStage::Unwind("reviews".to_string()));
            stages.push(PipelineStage::Group {
                keys: vec![key("category", "category"), key("color", "attributes.color")],
                aggregates: vec![mean("reviews.rating", "average_rating"), mean("price", "average_price")],
            });
        }
    }
    Pipeline {
        collection: "products".to_string(),
        stages,
    }
}

const CENSUS_FILTER_SQL: &str = r#"WHERE "dAge" BETWEEN $1::bigint AND $2::bigint
              AND "dIncome1" >= $3::bigint
              AND "iSex" = ANY($4::bigint[])"#;

fn census_sql(complexity: Complexity) -> SqlStatement {
    let select = match complexity {
        Complexity::Simple => r#"SELECT "iSex", COUNT(*) AS count FROM census_data"#,
        Complexity::Moderate => r#"SELECT "iSex", AVG("dIncome1")::float8 AS avg_income FROM census_data"#,
        Complexity::Complex => {
            r#"SELECT "iSex", "iMarital", AVG("dIncome1")::float8 AS mean, COUNT(*) AS count FROM census_data"#
        }
    };
    let group_by = match complexity {
        Complexity::Complex => r#"GROUP BY "iSex", "iMarital""#,
        _ => r#"GROUP BY "iSex""#,
    };
    SqlStatement {
        text: format!("{}\n            {}\n            {}", select, CENSUS_FILTER_SQL, group_by),
        params: vec![
            ParamSlot::AgeMin,
            ParamSlot::AgeMax,
            ParamSlot::IncomeThreshold,
            ParamSlot::SexOptions,
        ],
    }
}

fn ecommerce_sql(complexity: Complexity) -> SqlStatement {
    match complexity {
        Complexity::Simple => SqlStatement {
            text: "SELECT category, AVG(price)::float8 AS average_price
            FROM products
            WHERE price BETWEEN $1::float8 AND $2::float8
            GROUP BY category"
                .to_string(),
            params: vec![ParamSlot::PriceMin, ParamSlot::PriceMax],
        },
        Complexity::Moderate => SqlStatement {
            text: "SELECT p.category, AVG(r.rating)::float8 AS average_rating
            FROM products p
            JOIN reviews r ON p.product_id = r.product_id
            WHERE p.price BETWEEN $1::float8 AND $2::float8
              AND p.category = ANY($3::text[])
            GROUP BY p.category"
                .to_string(),
            params: vec![ParamSlot::PriceMin, ParamSlot::PriceMax, ParamSlot::Categories],
        },
        Complexity::Complex => SqlStatement {
            text: "SELECT p.category, p.color,
                   AVG(r.rating)::float8 AS average_rating,
                   AVG(p.price)::float8 AS average_price
            FROM products p
            JOIN reviews r ON p.product_id = r.product_id
            WHERE p.price BETWEEN $1::float8 AND $2::float8
              AND p.category = ANY($3::text[])
            GROUP BY p.category, p.color"
                .to_string(),
            params: vec![ParamSlot::PriceMin, ParamSlot::PriceMax, ParamSlot::Categories],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_is_total() {
        let catalog = QueryCatalog::standard().unwrap();
        assert_eq!(catalog.len(), 18);

        for key in CatalogKey::all() {
            let result = catalog.resolve(key.dataset, key.backend, key.complexity);
            if key.dataset == Dataset::Ecommerce && key.backend == Backend::FlatFile {
                assert!(result.unwrap_err().is_unsupported());
            } else {
                let descriptor = result.unwrap();
                assert_eq!(descriptor.key(), key);
            }
        }
    }

    #[test]
    fn test_descriptor_kind_matches_backend() {
        let catalog = QueryCatalog::standard().unwrap();
        for (key, entry) in catalog.entries() {
            if let CatalogEntry::Query(descriptor) = entry {
                let matches = matches!(
                    (key.backend, &descriptor.query),
                    (Backend::FlatFile, QuerySpec::Frame(_))
                        | (Backend::Relational, QuerySpec::Sql(_))
                        | (Backend::Document, QuerySpec::Pipeline(_))
                );
                assert!(matches, "{:?} has the wrong query kind", key);
            }
        }
    }

    #[test]
    fn test_outputs_follow_tier_shape() {
        let catalog = QueryCatalog::standard().unwrap();
        for (key, entry) in catalog.entries() {
            let CatalogEntry::Query(descriptor) = entry else { continue };
            let shape = tier_shape(key.dataset, key.complexity);
            match &descriptor.query {
                QuerySpec::Frame(plan) => {
                    assert_eq!(plan.group_by, shape.keys);
                    let aliases: Vec<&str> = plan.aggregates.iter().map(|a| a.alias()).collect();
                    assert_eq!(aliases, shape.measures);
                }
                QuerySpec::Pipeline(pipeline) => {
                    let Some(PipelineStage::Group { keys, aggregates }) = pipeline.stages.last() else {
                        panic!("{:?} does not end in a group stage", key);
                    };
                    let key_aliases: Vec<&str> = keys.iter().map(|k| k.alias.as_str()).collect();
                    let aliases: Vec<&str> = aggregates.iter().map(|a| a.alias()).collect();
                    assert_eq!(key_aliases, shape.keys);
                    assert_eq!(aliases, shape.measures);
                }
                QuerySpec::Sql(sql) => {
                    for measure in shape.measures {
                        assert!(sql.text.contains(&format!("AS {}", measure)), "{:?}: {}", key, sql.text);
                    }
                    let placeholders = (1..=sql.params.len()).filter(|n| sql.text.contains(&format!("${}", n)));
                    assert_eq!(placeholders.count(), sql.params.len());
                }
            }
        }
    }

    #[test]
    fn test_ecommerce_moderate_and_complex_unwind_reviews() {
        let catalog = QueryCatalog::standard().unwrap();
        for complexity in [Complexity::Moderate, Complexity::Complex] {
            let descriptor = catalog.resolve(Dataset::Ecommerce, Backend::Document, complexity).unwrap();
            let QuerySpec::Pipeline(pipeline) = &descriptor.query else { panic!("expected pipeline") };
            assert!(pipeline.stages.contains(&PipelineStage::Unwind("reviews".to_string())));
            assert!(descriptor.param_slots().contains(&ParamSlot::Categories));
        }

        let simple = catalog.resolve(Dataset::Ecommerce, Backend::Document, Complexity::Simple).unwrap();
        assert_eq!(simple.param_slots(), vec![ParamSlot::PriceMin, ParamSlot::PriceMax]);
    }

    #[test]
    fn test_incomplete_catalog_rejected() {
        let catalog = QueryCatalog::standard().unwrap();
        let mut entries: Vec<(CatalogKey, CatalogEntry)> =
            catalog.entries().into_iter().map(|(k, e)| (k, e.clone())).collect();
        entries.pop();

        let err = QueryCatalog::from_entries(entries).unwrap_err();
        assert!(err.to_string().contains("Catalog is incomplete"));
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let catalog = QueryCatalog::standard().unwrap();
        let mut entries: Vec<(CatalogKey, CatalogEntry)> =
            catalog.entries().into_iter().map(|(k, e)| (k, e.clone())).collect();
        let first = entries[0].clone();
        entries.push(first);

        let err = QueryCatalog::from_entries(entries).unwrap_err();
        assert!(err.to_string().contains("Duplicate catalog entry"));
    }
}
