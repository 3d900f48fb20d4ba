// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Random identifiers for public share links and documents.

use rand::RngExt;

/// Alphabet for public share ids: digits and lowercase letters.
pub const SHARE_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
pub const SHARE_ID_LEN: usize = 10;

const DOCUMENT_ID_ALPHABET: &[u8] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const DOCUMENT_ID_LEN: usize = 20;

/// Generate a public share id.
///
/// Uniqueness is not guaranteed; callers check the store before committing.
pub fn generate_share_id() -> String {
    random_string(SHARE_ID_ALPHABET, SHARE_ID_LEN)
}

/// Generate a document id for projects and tasks (Firestore auto-id shape).
pub fn generate_document_id() -> String {
    random_string(DOCUMENT_ID_ALPHABET, DOCUMENT_ID_LEN)
}

/// Whether `s` has the shape of a share id.
pub fn is_share_id(s: &str) -> bool {
    s.len() == SHARE_ID_LEN && s.bytes().all(|b| SHARE_ID_ALPHABET.contains(&b))
}

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}
