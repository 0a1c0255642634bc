use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::{Builder, Uuid};

use crate::utils::types::ECOMMERCE_CATEGORIES;

pub const COLORS: [&str; 5] = ["Red", "Blue", "Green", "Black", "White"];
pub const SIZES: [&str; 4] = ["S", "M", "L", "XL"];

const WORDS: [&str; 24] = [
    "alpha", "harbor", "velvet", "signal", "orbit", "maple", "quartz", "ember", "nimbus", "cobalt", "ridge", "lumen",
    "sable", "tundra", "pixel", "canyon", "meadow", "falcon", "prism", "cedar", "vertex", "aurora", "basalt", "willow",
];
const FIRST_NAMES: [&str; 10] = [
    "Alex", "Sam", "Jordan", "Taylor", "Morgan", "Casey", "Riley", "Jamie", "Avery", "Quinn",
];
const LAST_NAMES: [&str; 10] = [
    "Smith", "Garcia", "Chen", "Okafor", "Novak", "Silva", "Patel", "Larsen", "Kim", "Moreau",
];
const COMPANY_SUFFIXES: [&str; 4] = ["Inc", "LLC", "Group", "Ltd"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specifications {
    pub battery_life: Option<String>,
    pub warranty: String,
    pub manufacturer: String,
    pub features: Vec<String>,
    pub dimensions: Dimensions,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    pub color: String,
    pub size: String,
    pub weight: f64,
    pub specifications: Specifications,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub user: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub user: String,
    pub rating: i64,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
    pub likes: i64,
    pub dislikes: i64,
    pub responses: Vec<ReviewResponse>,
}

/// Product document with embedded reviews
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: Uuid,
    pub name: String,
    pub price: f64,
    pub category: String,
    pub attributes: Attributes,
    pub reviews: Vec<Review>,
    pub related_products: Vec<Uuid>,
}

/// Deterministic product generator
pub struct EcommerceGenerator {
    rng: StdRng,
    epoch: DateTime<Utc>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl EcommerceGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            epoch: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now),
        }
    }

    fn pick(&mut self, choices: &[&str]) -> String {
        choices.choose(&mut self.rng).copied().unwrap_or_default().to_string()
    }

    fn uuid(&mut self) -> Uuid {
        Builder::from_random_bytes(self.rng.gen()).into_uuid()
    }

    fn words(&mut self, min: usize, max: usize) -> Vec<String> {
        let count = self.rng.gen_range(min..=max);
        (0..count).map(|_| self.pick(&WORDS)).collect()
    }

    fn person(&mut self) -> String {
        format!("{} {}", self.pick(&FIRST_NAMES), self.pick(&LAST_NAMES))
    }

    fn sentence(&mut self) -> String {
        let mut sentence = self.words(4, 9).join(" ");
        if let Some(first) = sentence.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        sentence.push('.');
        sentence
    }

    fn timestamp(&mut self, within_days: i64) -> DateTime<Utc> {
        self.epoch + Duration::seconds(self.rng.gen_range(0..within_days * 86_400))
    }

    fn review(&mut self) -> Review {
        let responses = (0..self.rng.gen_range(0..=3))
            .map(|_| ReviewResponse {
                user: self.person(),
                response: self.sentence(),
                timestamp: self.timestamp(365),
            })
            .collect();

        Review {
            user: self.person(),
            rating: self.rng.gen_range(1..=5),
            comment: self.sentence(),
            timestamp: self.timestamp(3650),
            likes: self.rng.gen_range(0..=50),
            dislikes: self.rng.gen_range(0..=50),
            responses,
        }
    }

    pub fn product(&mut self) -> Product {
        let battery_life = self
            .rng
            .gen_bool(0.5)
            .then(|| format!("{} hours", self.rng.gen_range(1..=24)));
        let specifications = Specifications {
            battery_life,
            warranty: format!("{} years", self.rng.gen_range(1..=5)),
            manufacturer: format!("{} {}", capitalize(&self.pick(&WORDS)), self.pick(&COMPANY_SUFFIXES)),
            features: self.words(2, 5),
            dimensions: Dimensions {
                length: round2(self.rng.gen_range(5.0..=50.0)),
                width: round2(self.rng.gen_range(5.0..=50.0)),
                height: round2(self.rng.gen_range(5.0..=50.0)),
            },
            tags: self.words(5, 15),
        };

        Product {
            product_id: self.uuid(),
            name: self.pick(&WORDS),
            price: round2(self.rng.gen_range(10.0..=1000.0)),
            category: self.pick(&ECOMMERCE_CATEGORIES),
            attributes: Attributes {
                color: self.pick(&COLORS),
                size: self.pick(&SIZES),
                weight: round2(self.rng.gen_range(0.1..=10.0)),
                specifications,
            },
            reviews: (0..self.rng.gen_range(0..=10)).map(|_| self.review()).collect(),
            related_products: (0..self.rng.gen_range(1..=5)).map(|_| self.uuid()).collect(),
        }
    }

    pub fn products(&mut self, count: usize) -> Vec<Product> {
        (0..count).map(|_| self.product()).collect()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
