use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One respondent, using the recoded columns of the 1990 census extract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CensusRecord {
    pub caseid: i64,
    #[serde(rename = "dAge")]
    pub age: i64,
    #[serde(rename = "dIncome1")]
    pub income: i64,
    #[serde(rename = "iSex")]
    pub sex: i64,
    #[serde(rename = "iMarital")]
    pub marital: i64,
    #[serde(rename = "dHours")]
    pub hours: i64,
}

/// Deterministic census record generator
pub struct CensusGenerator {
    rng: StdRng,
    next_case: i64,
}

impl CensusGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            next_case: 10_000,
        }
    }

    pub fn record(&mut self) -> CensusRecord {
        let caseid = self.next_case;
        self.next_case += 1;
        CensusRecord {
            caseid,
            age: self.rng.gen_range(0..=7),
            income: self.rng.gen_range(0..=4),
            sex: self.rng.gen_range(0..=1),
            marital: self.rng.gen_range(0..=4),
            hours: self.rng.gen_range(0..=5),
        }
    }

    pub fn records(&mut self, count: usize) -> Vec<CensusRecord> {
        (0..count).map(|_| self.record()).collect()
    }
}
