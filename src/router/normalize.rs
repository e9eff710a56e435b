//! Shape a raw completion into the caller-facing result

use super::{AttemptResult, GenerationResult};
use crate::config::ProviderDescriptor;
use crate::providers::Completion;

/// Build the [`GenerationResult`] for a successful call
///
/// `position` is the provider's index in the full enabled priority list, not
/// in the filtered candidate list, so a skipped first choice still counts as
/// a fallback.
pub fn normalize(
    descriptor: &ProviderDescriptor,
    model: &str,
    completion: Completion,
    position: usize,
    attempts: Vec<AttemptResult>,
) -> GenerationResult {
    GenerationResult {
        response: completion.content,
        provider: descriptor.display_name().to_string(),
        provider_id: descriptor.id().to_string(),
        model: model.to_string(),
        fallback_used: position > 0,
        total_attempts: attempts.len(),
        usage: completion.usage,
        attempts,
    }
}
