use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use common::collab::ReviewChannel;
use common::{Error, Result, ReviewPayload, ReviewReply};

/// Console-backed reviewer: prints the proposed change and final metrics,
/// then reads a single line from stdin.
///
/// An empty line or an affirmative word approves; anything else rejects,
/// with the line kept as the rationale. The approval gate owns the
/// deadline — this channel just waits for one reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReviewer;

/// Words accepted as an explicit approval (case-insensitive).
const AFFIRMATIVE: &[&str] = &["y", "yes", "ok", "approve", "approved"];

pub fn render_payload(payload: &ReviewPayload) -> String {
    let change = match &payload.delta {
        Some(delta) => format!("Proposed change: {delta}"),
        None => "No parameter change proposed".to_string(),
    };
    let sharpe = payload
        .metrics
        .sharpe
        .map(|s| format!("{s:.2}"))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "{change}\nValidation: winrate {:.4} over {} trades, pnl {:.2}, sharpe {sharpe}\n\
         Approve? (Enter to approve, anything else rejects): ",
        payload.metrics.winrate, payload.metrics.trade_count, payload.metrics.total_pnl,
    )
}

#[async_trait]
impl ReviewChannel for ConsoleReviewer {
    async fn prompt(&self, payload: &ReviewPayload) -> Result<ReviewReply> {
        println!("{}", render_payload(payload));

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        reader
            .read_line(&mut line)
            .await
            .map_err(Error::Io)?;

        let trimmed = line.trim();
        let approved = trimmed.is_empty() || AFFIRMATIVE.contains(&trimmed.to_lowercase().as_str());
        info!(approved, "Reviewer replied");

        Ok(ReviewReply {
            approved,
            rationale: (!trimmed.is_empty()).then(|| trimmed.to_string()),
        })
    }
}
