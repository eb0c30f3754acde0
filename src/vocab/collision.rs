use std::collections::HashMap;

use indexmap::IndexMap;
use log::{debug, info};
use num::bigint::RandBigInt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SfileError};
use crate::vocab::TokenId;

/// Knobs for collision repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Give up when more than this fraction of the vocabulary collides.
    /// Random probing gets slow once the id space fills up.
    pub max_collision_ratio: f64,
    /// Random draws allowed per colliding token before failing.
    pub max_probes: usize,
    /// Seed for the probing generator, `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            max_collision_ratio: 0.05,
            max_probes: 10_000,
            seed: None,
        }
    }
}

/// Make `token_to_id` injective and return its inverse.
///
/// Tokens whose id is shared get fresh ids drawn uniformly from
/// `[0, 2^bit_precision)` until an id no other token holds is found. One
/// token of each colliding group keeps the original id. Which one is not
/// specified.
///
/// `token_to_id` is left untouched when an error is returned.
///
/// # Errors
/// * `Collision` if the collision count exceeds `max_collision_ratio * vocab_size`
/// * `ProbeExhausted` if a token finds no free id within `max_probes` draws
pub fn resolve_collisions<R>(
    token_to_id: &mut IndexMap<String, TokenId>,
    bit_precision: u32,
    config: &ResolveConfig,
    rng: &mut R,
) -> Result<HashMap<TokenId, String>>
where
    R: Rng + ?Sized,
{
    let vocab_size = token_to_id.len();
    let mut id_counts: HashMap<TokenId, usize> = HashMap::with_capacity(vocab_size);
    for id in token_to_id.values() {
        *id_counts.entry(id.clone()).or_insert(0) += 1;
    }

    let collisions = vocab_size - id_counts.len();
    if collisions as f64 > config.max_collision_ratio * vocab_size as f64 {
        return Err(SfileError::Collision { collisions, vocab_size });
    }

    let mut id_to_token = HashMap::with_capacity(vocab_size);
    let mut colliding = Vec::new();
    for (token, id) in token_to_id.iter() {
        if id_counts[id] == 1 {
            id_to_token.insert(id.clone(), token.clone());
        } else {
            colliding.push((token.clone(), id.clone()));
        }
    }

    // 途中で失敗しても token_to_id を壊さないよう、付け替えは最後にまとめて反映する
    let mut reassigned: Vec<(String, TokenId)> = Vec::new();
    for (token, old_id) in colliding {
        let remaining = id_counts.get_mut(&old_id).map(|count| {
            *count -= 1;
            *count
        });
        if remaining == Some(0) {
            // the rest of the group already moved away
            id_counts.insert(old_id.clone(), 1);
            id_to_token.insert(old_id, token);
            continue;
        }
        let new_id = probe_free_id(&id_counts, bit_precision, config.max_probes, rng)
            .ok_or_else(|| SfileError::ProbeExhausted {
                token: token.clone(),
                attempts: config.max_probes,
            })?;
        debug!("collision on id {old_id}: {token:?} moved to {new_id}");
        id_counts.insert(new_id.clone(), 1);
        id_to_token.insert(new_id.clone(), token.clone());
        reassigned.push((token, new_id));
    }

    if !reassigned.is_empty() {
        info!("resolved {collisions} collisions among {vocab_size} tokens ({} reassigned)", reassigned.len());
    }
    for (token, new_id) in reassigned {
        token_to_id.insert(token, new_id);
    }
    Ok(id_to_token)
}

fn probe_free_id<R>(id_counts: &HashMap<TokenId, usize>, bit_precision: u32, max_probes: usize, rng: &mut R) -> Option<TokenId>
where
    R: Rng + ?Sized,
{
    (0..max_probes)
        .map(|_| rng.gen_biguint(bit_precision as u64))
        .find(|candidate| !id_counts.contains_key(candidate))
}
