//! Email analyzer (spec §4.5 EmailAnalyzer).

use serde_json::json;

use super::{build_parameters, model_revision, read_raw_bytes, AnalyzerContext, MODEL_NAME};
use crate::error::{EtError, EtResult};
use crate::oracle::prompt_hash;
use crate::schema::{AnalysisOutputs, AnalysisRecord, EmailAnalysis, ModelInfo, Validate};

const PROMPT: &str = "Analyze this email thread for a legal investigation. Identify participants, \
authority dynamics, communication pattern, escalation, and any applicable risk flags.";

fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["thread_summary", "participants", "communication_pattern", "legal_significance", "risk_flags", "confidence_overall"],
    })
}

pub struct EmailAnalyzer {
    ctx: AnalyzerContext,
}

impl EmailAnalyzer {
    pub fn new(ctx: AnalyzerContext) -> Self {
        EmailAnalyzer { ctx }
    }

    pub async fn analyze(&self, sha256: &str) -> EtResult<AnalysisRecord> {
        let bundle = self.ctx.store.read_bundle(sha256)?.ok_or_else(|| EtError::Storage(format!("unknown evidence {sha256}")))?;
        let thread_text = parse_thread_text(&self.ctx.store, sha256, &bundle.evidence.extension)?;

        let hash = prompt_hash(PROMPT);
        let revision = model_revision();
        let analysis_id = AnalysisRecord::compute_analysis_id(sha256, &hash, &revision);
        if let Some(existing) = bundle.analyses.iter().find(|a| a.analysis_id == analysis_id) {
            return Ok(existing.clone());
        }

        let schema = response_schema();
        let (ai, usage): (EmailAnalysis, _) = self.ctx.oracle.analyze_email(&thread_text, PROMPT, &schema).await?;
        ai.validate().map_err(EtError::SchemaViolation)?;

        let record = AnalysisRecord::new(
            sha256,
            ModelInfo {
                name: MODEL_NAME.to_string(),
                revision,
            },
            build_parameters(hash, usage.input_tokens, usage.output_tokens),
            AnalysisOutputs::Email(ai),
        );
        record.validate().map_err(EtError::SchemaViolation)?;

        self.ctx.store.write_analysis(sha256, record.clone(), "email_analyzer", self.ctx.config.max_labels_per_evidence)?;
        Ok(record)
    }
}

/// Parses the message(s) into headers, participants, and an ordered body
/// (spec §4.5: "headers, participants, ordered bodies"), flattened into the
/// plain-text blob the oracle receives. An `.mbox` file concatenates
/// multiple "From "-delimited RFC 5322 messages; each is parsed and
/// appended in order rather than only the first.
fn parse_thread_text(store: &crate::store::Store, sha256: &str, extension: &str) -> EtResult<String> {
    let bytes = read_raw_bytes(store, sha256, extension)?;
    let chunks = split_mbox_messages(&bytes);

    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let message = mail_parser::MessageParser::default()
            .parse(chunk)
            .ok_or_else(|| EtError::Input(format!("email message {} of {} could not be parsed", i + 1, chunks.len())))?;
        if chunks.len() > 1 {
            out.push_str(&format!("--- message {} of {} ---\n", i + 1, chunks.len()));
        }
        append_message_text(&message, &mut out);
        out.push('\n');
    }
    Ok(out)
}

fn append_message_text(message: &mail_parser::Message, out: &mut String) {
    if let Some(subject) = message.subject() {
        out.push_str(&format!("Subject: {subject}\n"));
    }
    if let Some(from) = message.from() {
        for addr in from.iter() {
            if let Some(email) = addr.address() {
                out.push_str(&format!("From: {email}\n"));
            }
        }
    }
    if let Some(to) = message.to() {
        for addr in to.iter() {
            if let Some(email) = addr.address() {
                out.push_str(&format!("To: {email}\n"));
            }
        }
    }
    if let Some(date) = message.date() {
        out.push_str(&format!("Date: {date}\n"));
    }
    out.push('\n');
    if let Some(body) = message.body_text(0) {
        out.push_str(&body);
    } else if let Some(body) = message.body_html(0) {
        out.push_str(&body);
    }
}

/// Splits an mbox's concatenated messages on lines starting with "From "
/// (the mbox envelope separator), stripping that separator line before
/// handing each chunk to the RFC 5322 parser. A single `.eml` with no such
/// line is returned unchanged as one chunk.
fn split_mbox_messages(bytes: &[u8]) -> Vec<&[u8]> {
    if !bytes.starts_with(b"From ") {
        return vec![bytes];
    }

    let mut boundaries = vec![0usize];
    for i in 0..bytes.len() {
        if bytes[i] == b'\n' {
            let next = i + 1;
            if next < bytes.len() && bytes[next..].starts_with(b"From ") {
                boundaries.push(next);
            }
        }
    }
    boundaries.push(bytes.len());

    boundaries
        .windows(2)
        .map(|w| {
            let chunk = &bytes[w[0]..w[1]];
            match chunk.iter().position(|&b| b == b'\n') {
                Some(nl) => &chunk[nl + 1..],
                None => chunk,
            }
        })
        .collect()
}
