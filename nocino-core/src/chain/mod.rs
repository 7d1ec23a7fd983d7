use rand::rngs::StdRng;
use rand::seq::{IteratorRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Number of preceding words used as a key when none is configured.
pub const DEFAULT_PREFIX_LEN: usize = 1;

/// Splits a message into the words the chain works with.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

// --- 1. Model ---

/// Prefix -> suffix bag. Every key maps to a non-empty bag; duplicates are
/// kept so a uniform pick from the bag is weighted by observed frequency.
#[derive(Debug)]
struct Model {
    prefix_len: usize,
    transitions: FxHashMap<String, Vec<String>>,
}

impl Model {
    fn new(prefix_len: usize) -> Self {
        Self {
            prefix_len,
            transitions: FxHashMap::default(),
        }
    }

    fn insert(&mut self, tokens: &[String]) -> usize {
        let mut inserted = 0;
        for window in tokens.windows(self.prefix_len + 1) {
            let (prefix, suffix) = window.split_at(self.prefix_len);
            self.transitions
                .entry(prefix.join(" "))
                .or_default()
                .push(suffix[0].clone());
            inserted += 1;
        }
        inserted
    }

    /// Picks the starting cursor: the seed's trailing prefix when the model
    /// knows it, a uniformly random prefix otherwise.
    fn start<R: Rng + ?Sized>(&self, seed: &[String], rng: &mut R) -> Option<Vec<String>> {
        if let Some(from) = seed.len().checked_sub(self.prefix_len) {
            let tail = &seed[from..];
            if self.transitions.contains_key(&tail.join(" ")) {
                return Some(tail.to_vec());
            }
        }

        self.transitions
            .keys()
            .choose(rng)
            .map(|key| key.split(' ').map(str::to_string).collect())
    }

    fn walk<R: Rng + ?Sized>(&self, max_words: usize, seed: &[String], rng: &mut R) -> Vec<String> {
        if max_words == 0 {
            return Vec::new();
        }
        let Some(mut cursor) = self.start(seed, rng) else {
            return Vec::new();
        };

        let mut output: Vec<String> = cursor.iter().take(max_words).cloned().collect();
        while output.len() < max_words {
            let Some(next) = self
                .transitions
                .get(&cursor.join(" "))
                .and_then(|bag| bag.choose(rng))
            else {
                break;
            };
            output.push(next.clone());
            cursor.remove(0);
            cursor.push(next.clone());
        }
        output
    }
}

// --- 2. Shared Store ---

/// Markov chain trained online from the conversation.
///
/// Every public call takes the single internal lock for its whole duration,
/// so a concurrent `train` never interleaves with a `generate` reading the
/// same suffix bag.
#[derive(Debug)]
pub struct ChainStore {
    model: Mutex<Model>,
}

impl Default for ChainStore {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX_LEN)
    }
}

impl ChainStore {
    pub fn new(prefix_len: usize) -> Self {
        Self {
            model: Mutex::new(Model::new(prefix_len.max(1))),
        }
    }

    /// Trains on whitespace separated text.
    pub async fn train(&self, text: &str) {
        self.train_tokens(&tokenize(text)).await;
    }

    /// Records every (prefix, next word) pair of `tokens`. Sequences too short
    /// to contain a single pair leave the store untouched.
    pub async fn train_tokens(&self, tokens: &[String]) {
        let mut model = self.model.lock().await;
        let inserted = model.insert(tokens);
        tracing::trace!(inserted, prefixes = model.transitions.len(), "Chain trained");
    }

    /// Synthesizes at most `max_words` words starting from the end of `seed`.
    /// Returns an empty string when nothing has been learned yet.
    pub async fn generate(&self, max_words: usize, seed: &str) -> (String, Duration) {
        let mut rng = StdRng::from_entropy();
        self.generate_with(&mut rng, max_words, seed).await
    }

    pub async fn generate_with<R: Rng + Send>(
        &self,
        rng: &mut R,
        max_words: usize,
        seed: &str,
    ) -> (String, Duration) {
        let started = Instant::now();
        let seed_tokens = tokenize(seed);
        let words = {
            let model = self.model.lock().await;
            model.walk(max_words, &seed_tokens, rng)
        };
        (words.join(" "), started.elapsed())
    }

    /// Number of distinct prefixes.
    pub async fn len(&self) -> usize {
        self.model.lock().await.transitions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.model.lock().await.transitions.is_empty()
    }

    /// Snapshot of the suffix bag recorded for `prefix`.
    pub async fn suffixes(&self, prefix: &str) -> Vec<String> {
        self.model
            .lock()
            .await
            .transitions
            .get(prefix)
            .cloned()
            .unwrap_or_default()
    }
}
