use async_trait::async_trait;
use rcsd_core::{DecisionPayload, HitlDecision, RcsdResult, ReviewerChannel};

/// Reviewer channel that prompts on stderr and reads the decision from stdin.
///
/// The gate owns the deadline; this channel only waits for a line.
pub struct StdinReviewer {
    reviewer: String,
}

impl StdinReviewer {
    pub fn new() -> Self {
        let reviewer = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "cli-user".to_string());
        Self { reviewer }
    }
}

impl Default for StdinReviewer {
    fn default() -> Self {
        Self::new()
    }
}

/// The prompt shown for a gate, with ANSI colors.
pub fn format_review_prompt(payload: &DecisionPayload) -> String {
    let mut prompt = String::new();
    prompt.push_str("\n\x1b[1;37m╔══ REVIEW REQUIRED ══╗\x1b[0m\n");
    prompt.push_str(&format!("  Run:       {}\n", payload.run_id));
    prompt.push_str(&format!("  Topic:     {}\n", payload.topic));
    prompt.push_str(&format!("  After:     \x1b[36m{}\x1b[0m\n", payload.checkpoint));
    if !payload.summary.is_empty() {
        prompt.push_str(&format!("  Summary:   {}\n", payload.summary));
    }
    prompt.push_str(&format!(
        "  Deadline:  {}\n",
        payload.deadline.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    prompt.push_str("\x1b[1;37m╚═════════════════════╝\x1b[0m\n");
    prompt.push_str("  Approve? [y/N/comment]: ");
    prompt
}

/// `y`/`yes` approves; empty, `n`/`no` or any other text rejects, the text
/// becoming the comment.
pub fn parse_review_input(input: &str) -> (bool, Option<String>) {
    let trimmed = input.trim();
    match trimmed.to_lowercase().as_str() {
        "y" | "yes" => (true, None),
        "n" | "no" | "" => (false, None),
        _ => (false, Some(trimmed.to_string())),
    }
}

#[async_trait]
impl ReviewerChannel for StdinReviewer {
    async fn review(&self, payload: DecisionPayload) -> RcsdResult<Option<HitlDecision>> {
        eprint!("{}", format_review_prompt(&payload));

        // The blocking read is not cancellable and outlives a gate that times
        // out; the binary exits with `process::exit` so shutdown never waits on it.
        let input = tokio::task::spawn_blocking(|| {
            let mut input = String::new();
            std::io::stdin().read_line(&mut input).map(|n| (n, input))
        })
        .await;

        match input {
            // EOF: nobody is at the terminal.
            Ok(Ok((0, _))) => {
                eprintln!("  → no input\n");
                Ok(None)
            }
            Ok(Ok((_, line))) => {
                let (approved, comment) = parse_review_input(&line);
                if approved {
                    eprintln!("  → APPROVED\n");
                    Ok(Some(HitlDecision::approve(self.reviewer.clone())))
                } else {
                    eprintln!("  → REJECTED\n");
                    Ok(Some(HitlDecision::reject(self.reviewer.clone(), comment)))
                }
            }
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(std::io::Error::other(e).into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rcsd_core::Stage;
    use uuid::Uuid;

    fn payload(summary: &str) -> DecisionPayload {
        DecisionPayload {
            gate_id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            checkpoint: Stage::Spec,
            topic: "rate limiting".into(),
            summary: summary.into(),
            details: serde_json::Value::Null,
            deadline: Utc::now(),
        }
    }

    #[test]
    fn test_prompt_shows_checkpoint_and_topic() {
        let p = payload("Spec 'Limiter' passed validation.");
        let prompt = format_review_prompt(&p);
        assert!(prompt.contains("rate limiting"));
        assert!(prompt.contains("spec"));
        assert!(prompt.contains(&p.run_id.to_string()));
        assert!(prompt.contains("Summary:"));
        assert!(prompt.ends_with("[y/N/comment]: "));
    }

    #[test]
    fn test_prompt_without_summary() {
        assert!(!format_review_prompt(&payload("")).contains("Summary:"));
    }

    #[test]
    fn test_parse_review_input() {
        assert_eq!(parse_review_input("y"), (true, None));
        assert_eq!(parse_review_input("YES\n"), (true, None));
        assert_eq!(parse_review_input("n"), (false, None));
        assert_eq!(parse_review_input("\n"), (false, None));
        assert_eq!(
            parse_review_input("  Needs Burst Limits \n"),
            (false, Some("Needs Burst Limits".to_string()))
        );
    }
}
