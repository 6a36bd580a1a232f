//! Narrow collaborator contracts for the masking, guardrail, and audit
//! hooks (§4.5 steps 3/4/12, §9). Each is a pipeline of pure-ish functions;
//! no retries, no state. Concrete rule engines, classifiers, and the
//! encrypted audit sink are external collaborators — only the contracts and
//! the in-process pipeline runner live here.

use async_trait::async_trait;
use common::Envelope;
use serde_json::Value;

/// One entry of an audit log: a free-form tag plus a JSON payload. The
/// auditor collaborator decides whether/how to persist it.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub audit_type: String,
    pub payload: Value,
}

#[async_trait]
pub trait Masker: Send + Sync {
    fn name(&self) -> &str;
    async fn apply(&self, envelope: Envelope) -> (Envelope, Option<AuditRecord>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardrailVerdict {
    Allow,
    Block { reason: String },
}

#[async_trait]
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &str;
    async fn classify(&self, envelope: &Envelope) -> (GuardrailVerdict, Option<AuditRecord>);
}

#[async_trait]
pub trait Auditor: Send + Sync {
    async fn log(&self, record: AuditRecord);
}

/// An auditor that drops every record; used when no auditor is configured.
pub struct NullAuditor;

#[async_trait]
impl Auditor for NullAuditor {
    async fn log(&self, _record: AuditRecord) {}
}

/// Runs a masker pipeline in order, forwarding each produced audit record to
/// `auditor`. Returns the rewritten envelope.
pub async fn run_maskers(
    maskers: &[Box<dyn Masker>],
    auditor: &dyn Auditor,
    mut envelope: Envelope,
) -> Envelope {
    for masker in maskers {
        let (rewritten, audit) = masker.apply(envelope).await;
        envelope = rewritten;
        if let Some(record) = audit {
            auditor.log(record).await;
        }
    }
    envelope
}

/// Runs a guardrail pipeline in order; the first `Block` short-circuits.
pub async fn run_guardrails(
    guardrails: &[Box<dyn Guardrail>],
    auditor: &dyn Auditor,
    envelope: &Envelope,
) -> GuardrailVerdict {
    for guardrail in guardrails {
        let (verdict, audit) = guardrail.classify(envelope).await;
        if let Some(record) = audit {
            auditor.log(record).await;
        }
        if let GuardrailVerdict::Block { .. } = verdict {
            return verdict;
        }
    }
    GuardrailVerdict::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UppercaseContentMasker;

    #[async_trait]
    impl Masker for UppercaseContentMasker {
        fn name(&self) -> &str {
            "uppercase"
        }

        async fn apply(&self, envelope: Envelope) -> (Envelope, Option<AuditRecord>) {
            let record = AuditRecord {
                audit_type: "mask".to_string(),
                payload: serde_json::json!({"masker": "uppercase"}),
            };
            (envelope, Some(record))
        }
    }

    struct AlwaysBlock;

    #[async_trait]
    impl Guardrail for AlwaysBlock {
        fn name(&self) -> &str {
            "always_block"
        }

        async fn classify(&self, _envelope: &Envelope) -> (GuardrailVerdict, Option<AuditRecord>) {
            (
                GuardrailVerdict::Block {
                    reason: "test".to_string(),
                },
                None,
            )
        }
    }

    #[tokio::test]
    async fn masker_pipeline_forwards_audit_records() {
        let maskers: Vec<Box<dyn Masker>> = vec![Box::new(UppercaseContentMasker)];
        let envelope = Envelope::new();
        let out = run_maskers(&maskers, &NullAuditor, envelope).await;
        assert!(out.as_map().is_empty());
    }

    #[tokio::test]
    async fn first_block_short_circuits_guardrail_pipeline() {
        let guardrails: Vec<Box<dyn Guardrail>> = vec![Box::new(AlwaysBlock)];
        let envelope = Envelope::new();
        let verdict = run_guardrails(&guardrails, &NullAuditor, &envelope).await;
        assert_eq!(
            verdict,
            GuardrailVerdict::Block {
                reason: "test".to_string()
            }
        );
    }
}
