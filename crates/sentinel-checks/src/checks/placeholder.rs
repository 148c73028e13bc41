//! S3 through S10: the business-logic checks external to this core. Their
//! bodies (relationship-quality heuristics, metrics-pipeline inspection, and
//! so on) are out of scope here; each still exposes the same `Execute()`
//! contract so the runner and alert manager cannot tell a placeholder from
//! a real implementation.

use async_trait::async_trait;

use crate::{Check, CheckOutcome};

pub struct PlaceholderCheck {
    id: &'static str,
    description: &'static str,
}

impl PlaceholderCheck {
    pub fn new(id: &'static str, description: &'static str) -> Self {
        Self { id, description }
    }
}

#[async_trait]
impl Check for PlaceholderCheck {
    fn id(&self) -> &str {
        self.id
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn run(&self) -> CheckOutcome {
        CheckOutcome::pass("Placeholder check - always passes", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_schemas::CheckStatus;

    #[tokio::test]
    async fn placeholder_always_passes() {
        let check = PlaceholderCheck::new("S3-paraphrase-robustness", "Paraphrase robustness of retrieval");
        let outcome = check.run().await;
        assert_eq!(outcome.status, CheckStatus::Pass);
        assert_eq!(check.id(), "S3-paraphrase-robustness");
    }
}
