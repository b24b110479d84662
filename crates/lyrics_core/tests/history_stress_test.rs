//! Long edit sequences survive serialization and replay.

use lyrics_core::diff;
use lyrics_core::extension::{decode_capsule, encode_capsule};
use lyrics_core::history::HistoryLedger;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound.max(1) as u64) as usize
    }
}

const HEADER: &str = "Title: Stress\n";
const ALPHABET: &[char] = &['a', 'e', 'o', 'r', 'w', ' ', '\n', ',', 'é', 'ß', '🎵'];
const PHRASES: &[&str] = &[
    "Row, row, row your boat\n",
    "Gently down the stream\n",
    "Merrily, merrily, merrily, merrily\n",
    "Life is but a dream\n",
];

/// Apply one random edit after the fixed header.
fn mutate(text: &str, rng: &mut Lcg) -> String {
    let header_len = HEADER.chars().count();
    let mut chars: Vec<char> = text.chars().collect();
    let body_len = chars.len() - header_len;

    match rng.below(10) {
        // Large-span replacement
        0 if body_len > 0 => {
            let start = header_len + rng.below(body_len);
            let end = (start + rng.below(150)).min(chars.len());
            let phrase = PHRASES[rng.below(PHRASES.len())];
            chars.splice(start..end, phrase.chars());
        }
        // Large-span insertion
        1 => {
            let at = header_len + rng.below(body_len + 1);
            let phrase = PHRASES[rng.below(PHRASES.len())].repeat(1 + rng.below(4));
            chars.splice(at..at, phrase.chars());
        }
        // Single-char deletion
        2 | 3 if body_len > 0 => {
            chars.remove(header_len + rng.below(body_len));
        }
        // Single-char insertion or replacement
        _ => {
            let c = ALPHABET[rng.below(ALPHABET.len())];
            let at = header_len + rng.below(body_len + 1);
            if at < chars.len() && rng.below(2) == 0 {
                chars[at] = c;
            } else {
                chars.insert(at, c);
            }
        }
    }

    // Keep the body moderately sized.
    if chars.len() > 1500 {
        chars.truncate(header_len + 800);
    }
    chars.into_iter().collect()
}

#[test]
fn ten_thousand_edits_roundtrip() {
    init_logging();

    let mut rng = Lcg(0x5eed);
    let mut ledger = HistoryLedger::new();
    let mut text = format!("{}{}", HEADER, PHRASES.concat());
    assert!(ledger.add(&text));

    let mut recorded = 1;
    let mut checkpoints = Vec::new();
    for step in 0..10_000 {
        text = mutate(&text, &mut rng);
        if ledger.add(&text) {
            recorded += 1;
        }
        if step % 2_500 == 0 {
            checkpoints.push((ledger.len() - 1, text.clone()));
        }
    }

    assert!(recorded > 9_000, "only {} edits recorded", recorded);
    assert_eq!(ledger.len(), recorded);
    assert_eq!(ledger.full_text(), text);

    let bytes = encode_capsule(&ledger.serialize());
    let mut restored = HistoryLedger::restored(&decode_capsule(&bytes));
    assert_eq!(restored.len(), recorded);
    assert_eq!(restored.full_text(), text);

    for (index, expected) in checkpoints {
        assert_eq!(restored.text_at(index).as_deref(), Some(expected.as_str()));
    }
}

#[test]
fn every_diff_applies_exactly() {
    let mut rng = Lcg(42);
    let mut text = format!("{}{}", HEADER, PHRASES.concat());
    for _ in 0..2_000 {
        let next = mutate(&text, &mut rng);
        assert_eq!(diff::apply(&text, &diff::diff(&text, &next)), next);
        text = next;
    }
}

#[test]
fn incremental_history_matches_each_state() {
    let mut rng = Lcg(7);
    let mut ledger = HistoryLedger::new();
    let mut states = Vec::new();
    let mut text = format!("{}{}", HEADER, PHRASES[0]);

    for _ in 0..300 {
        if ledger.add(&text) {
            states.push(text.clone());
        }
        text = mutate(&text, &mut rng);
    }

    let snapshots = ledger.incremental_history();
    let replayed: Vec<String> = snapshots.into_iter().map(|s| s.text).collect();
    assert_eq!(replayed, states);
}
