#![allow(dead_code, reason = "each integration test crate uses a subset of these helpers")]

// Shared helpers for integration tests

use std::fs;
use std::path::Path;
use vuln_rag::embeddings::Embedder;

pub const DIMENSION: usize = 256;

/// Bag-of-words embedder: each lower-cased token is hashed into one of
/// `DIMENSION` buckets. Identical texts always produce identical vectors.
pub struct HashingEmbedder;

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; DIMENSION];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) as usize % DIMENSION;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        "hashing-test"
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Ten pattern documents across three vulnerability classes
pub const PATTERNS: [(&str, &str); 10] = [
    (
        "sql_injection/string_concat.md",
        "# String concatenation\n\ndb.query(\"SELECT * FROM users WHERE id=\" + userId)",
    ),
    (
        "sql_injection/template_literal.md",
        "# Template literal\n\ndb.query(`SELECT * FROM users WHERE username LIKE '%${term}%'`)",
    ),
    (
        "sql_injection/insert_values.md",
        "# Insert values\n\ndb.query(\"INSERT INTO logs (action) VALUES ('\" + action + \"')\")",
    ),
    (
        "sql_injection/order_by.md",
        "# Dynamic ORDER BY\n\nknex.raw(`ORDER BY ${req.query.sort} DESC`)",
    ),
    (
        "xss/reflected_html.md",
        "# Reflected HTML\n\nres.send(`<h1>Results for: ${searchTerm}</h1>`)",
    ),
    (
        "xss/stored_output.md",
        "# Stored output\n\nhtml += `<div>${log.action}: ${log.details}</div>`",
    ),
    (
        "xss/inner_html.md",
        "# innerHTML sink\n\nelement.innerHTML = location.hash.slice(1)",
    ),
    (
        "xss/script_context.md",
        "# Script context\n\n<script>window.location=\"${target}\";</script>",
    ),
    (
        "open_redirect/query_param.md",
        "# Query parameter redirect\n\nres.redirect(req.query.url)",
    ),
    (
        "open_redirect/header_location.md",
        "# Location header\n\nres.setHeader('Location', req.body.next)",
    ),
];

/// Write `files` (relative path, content) under `root`
pub fn write_corpus(root: &Path, files: &[(&str, &str)]) {
    for (relative, content) in files {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().expect("corpus file has a parent"))
            .expect("should create category directory");
        fs::write(path, content).expect("should write pattern file");
    }
}
