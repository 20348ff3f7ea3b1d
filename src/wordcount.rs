//! Word Count
//!
//! The reference MapReduce job: documents keyed by id, output is the number
//! of occurrences of every word. Registered on every node by the binary so
//! the `/mapreduce/wordcount` endpoint can ship it.

use crate::mapreduce::functions::FunctionRegistry;
use crate::mapreduce::types::{Collector, Mapper, Reducer};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z0-9']+\b").expect("word pattern is valid"));

/// Lowercased words of `text`, in order, duplicates kept.
pub fn tokenize(text: &str) -> Vec<String> {
    WORD.find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WordCountMapper;

impl Mapper<String, String, String, u64> for WordCountMapper {
    const NAME: &'static str = "wordcount.mapper";

    fn map(&self, _key: String, document: String, collector: &mut Collector<'_, String, u64>) {
        for word in tokenize(&document) {
            collector.emit(word, 1);
        }
    }
}

/// Sums counts. Also used as the combiner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WordCountReducer;

impl Reducer<String, u64> for WordCountReducer {
    const NAME: &'static str = "wordcount.reducer";

    fn reduce(&self, _word: &String, counts: Vec<u64>) -> u64 {
        counts.into_iter().sum()
    }
}

pub fn register(functions: &FunctionRegistry) {
    functions.register_mapper::<WordCountMapper, String, String, String, u64>();
    functions.register_reducer::<WordCountReducer, String, u64>();
}
