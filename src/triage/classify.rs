use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::SecondsFormat;
use serde::Deserialize;

use crate::domain::message::{ClassificationResult, Message};
use crate::error::{Result, TriageError};
use crate::llm::InferenceEndpoint;
use crate::mail::decoders::truncate_chars;

/// What happened to one batch.
#[derive(Debug)]
pub enum BatchOutcome {
    Classified {
        index: usize,
        size: usize,
        merge: MergeStats,
    },
    Failed {
        index: usize,
        size: usize,
        error: TriageError,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub merged: usize,
    /// Results naming an id that is not in the batch.
    pub unmatched: usize,
    /// Results repeating an id already merged in the batch.
    pub duplicates: usize,
}

#[derive(Debug, Default)]
pub struct ClassifyReport {
    pub messages: Vec<Message>,
    pub batches: Vec<BatchOutcome>,
}

impl ClassifyReport {
    pub fn failed_batches(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| matches!(b, BatchOutcome::Failed { .. }))
            .count()
    }

    pub fn all_batches_failed(&self) -> bool {
        !self.batches.is_empty() && self.failed_batches() == self.batches.len()
    }
}

pub struct Classifier<'a> {
    endpoint: &'a dyn InferenceEndpoint,
    batch_size: usize,
    preview_chars: usize,
    owner: String,
}

impl<'a> Classifier<'a> {
    pub fn new(
        endpoint: &'a dyn InferenceEndpoint,
        batch_size: usize,
        preview_chars: usize,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            endpoint,
            batch_size: batch_size.max(1),
            preview_chars,
            owner: owner.into(),
        }
    }

    /// Classifies `messages` batch by batch. Only messages that received a
    /// result come back; a failed batch contributes nothing and does not stop
    /// the others.
    pub fn classify(&self, messages: Vec<Message>) -> ClassifyReport {
        let mut report = ClassifyReport::default();
        let mut emitted: HashSet<String> = HashSet::new();
        let mut pending = messages.into_iter();

        for index in 0.. {
            let mut batch: Vec<Message> = pending.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }
            let size = batch.len();
            for m in &mut batch {
                m.classification = None;
            }

            log::info!("classifying batch {} ({size} messages)", index + 1);
            match self.classify_batch(&mut batch) {
                Ok(merge) => {
                    log::info!(
                        "batch {}: {} classified, {} unmatched results",
                        index + 1,
                        merge.merged,
                        merge.unmatched
                    );
                    report.messages.extend(
                        batch
                            .into_iter()
                            .filter(|m| m.classification.is_some())
                            .filter(|m| emitted.insert(m.id.clone())),
                    );
                    report
                        .batches
                        .push(BatchOutcome::Classified { index, size, merge });
                }
                Err(error) => {
                    log::warn!("batch {} skipped: {error}", index + 1);
                    report
                        .batches
                        .push(BatchOutcome::Failed { index, size, error });
                }
            }
        }

        report
    }

    fn classify_batch(&self, batch: &mut [Message]) -> Result<MergeStats> {
        let prompt = self.build_prompt(batch);
        let raw = self.endpoint.complete(&prompt)?;
        let results = parse_results(&raw, batch.len())?;
        Ok(merge_results(batch, results))
    }

    /// Renders the request for one batch. Same batch, same text.
    pub fn build_prompt(&self, batch: &[Message]) -> String {
        let n = batch.len();
        let mut listing = String::new();
        for m in batch {
            let _ = writeln!(listing, "ID: {}", m.id);
            let _ = writeln!(listing, "  From: {}", m.sender);
            if !m.to.is_empty() {
                let _ = writeln!(listing, "  To: {}", m.to.join(", "));
            }
            if !m.cc.is_empty() {
                let _ = writeln!(listing, "  Cc: {}", m.cc.join(", "));
            }
            let _ = writeln!(listing, "  Subject: {}", m.subject);
            let _ = writeln!(
                listing,
                "  Preview: {}",
                truncate_chars(&m.preview, self.preview_chars)
            );
            let _ = writeln!(
                listing,
                "  Received: {}",
                m.received_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
            listing.push('\n');
        }

        format!(
            r#"Categorize ALL {n} emails below for {owner}.

{listing}You MUST return exactly {n} results, one for EACH email above, using the IDs exactly as given.

For each email, determine:
1. priority: "urgent" (time-sensitive or critical), "high" (important), "medium" (normal), or "fyi" (informational only)
2. addressed_directly: true if {owner} is a primary (To:) recipient, false if only copied (Cc:) or not listed
3. requires_action: true if the email needs a response or action from {owner}, false if it is informational

Rules:
- Portfolio company executives, investors, banks, lenders and legal counsel = high priority
- Internal team emails addressed directly = medium priority unless the matter is urgent
- Copied emails = fyi priority unless they explicitly ask {owner} to do something
- Automated notifications, receipts, newsletters and no-reply senders = fyi priority

Return ONLY a JSON array with exactly {n} objects, no markdown and no explanation:
[
  {{"id": "<ID from above>", "priority": "high", "addressed_directly": true, "requires_action": true}}
]"#,
            owner = self.owner,
        )
    }
}

/// Strips markdown code fences and surrounding whitespace.
pub fn sanitize_response(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string ("json") along with the opening fence.
        text = rest.split_once('\n').map_or(rest, |(_, body)| body);
    }
    if let Some(body) = text.trim_end().strip_suffix("```") {
        text = body;
    }
    text.trim()
}

/// Parses the endpoint text as exactly `expected` results. The array may sit
/// after a preamble that itself contains brackets, so every `[` is tried in
/// turn and the first one that opens a result array wins.
pub fn parse_results(raw: &str, expected: usize) -> Result<Vec<ClassificationResult>> {
    let payload = sanitize_response(raw);
    let mut first_error = None;
    let mut results = None;
    for (start, _) in payload.match_indices('[') {
        let mut de = serde_json::Deserializer::from_str(&payload[start..]);
        match Vec::<ClassificationResult>::deserialize(&mut de) {
            Ok(parsed) => {
                results = Some(parsed);
                break;
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    let results = results.ok_or_else(|| match first_error {
        Some(e) => TriageError::Validation(format!("response is not a result array: {e}")),
        None => TriageError::Validation("response contains no JSON array".to_string()),
    })?;
    if results.len() != expected {
        return Err(TriageError::Validation(format!(
            "expected {expected} results, got {}",
            results.len()
        )));
    }
    Ok(results)
}

/// Applies each result to the batch member with the same id. Foreign ids and
/// repeats are dropped; members without a result stay unclassified.
pub fn merge_results(batch: &mut [Message], results: Vec<ClassificationResult>) -> MergeStats {
    let mut stats = MergeStats::default();
    for r in results {
        match batch.iter_mut().find(|m| m.id == r.id) {
            Some(m) if m.classification.is_none() => {
                m.classification = Some(r.classification());
                stats.merged += 1;
            }
            Some(_) => {
                log::debug!("{}: duplicate result dropped", r.id);
                stats.duplicates += 1;
            }
            None => {
                log::debug!("{}: result matches no message in the batch", r.id);
                stats.unmatched += 1;
            }
        }
    }
    stats
}
