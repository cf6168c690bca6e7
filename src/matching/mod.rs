//! Fuzzy matching primitives used by pairwise scoring

pub mod fuzzy;

pub use fuzzy::{
    compare_phones, compare_phones_opt, has_formatting, levenshtein, normalize_phone, similarity,
    similarity_opt,
};
