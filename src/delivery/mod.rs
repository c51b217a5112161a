// Signal delivery: sinks and human-readable message formatting
use crate::models::{Direction, Signal};
use crate::risk::{DailySummary, RiskStatus};
use std::fmt::Write;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Error, PartialEq)]
pub enum DeliveryError {
    #[error("delivery channel is full")]
    ChannelFull,

    #[error("delivery channel is closed")]
    ChannelClosed,
}

/// Receives emitted signals; implementations must not block
pub trait SignalSink: Send + Sync {
    fn deliver(&self, signal: &Signal) -> Result<(), DeliveryError>;

    fn deliver_summary(&self, _summary: &DailySummary) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Writes signals to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl SignalSink for LogSink {
    fn deliver(&self, signal: &Signal) -> Result<(), DeliveryError> {
        info!("\n{}", format_signal_message(signal));
        Ok(())
    }

    fn deliver_summary(&self, summary: &DailySummary) -> Result<(), DeliveryError> {
        info!("\n{}", format_daily_summary(summary));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Signal(Box<Signal>),
    Summary(DailySummary),
}

/// Hands notifications to a bounded tokio channel without waiting
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Notification>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    fn send(&self, notification: Notification) -> Result<(), DeliveryError> {
        self.tx.try_send(notification).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::ChannelClosed,
        })
    }
}

impl SignalSink for ChannelSink {
    fn deliver(&self, signal: &Signal) -> Result<(), DeliveryError> {
        self.send(Notification::Signal(Box::new(signal.clone())))
    }

    fn deliver_summary(&self, summary: &DailySummary) -> Result<(), DeliveryError> {
        self.send(Notification::Summary(summary.clone()))
    }
}

/// Multi-line message for manual execution
pub fn format_signal_message(signal: &Signal) -> String {
    let icon = match signal.direction {
        Direction::Bullish => "🟢",
        Direction::Bearish => "🔴",
    };
    let risk_per_unit = (signal.entry - signal.stop_loss).abs();

    let mut msg = String::new();
    let _ = writeln!(
        msg,
        "{} {} {} | {}",
        icon,
        signal.instrument,
        signal.option_type(),
        signal.contract.symbol
    );
    let _ = writeln!(
        msg,
        "Pattern: {} | Score {:.1}/10",
        signal.pattern, signal.confluence_score
    );
    let _ = writeln!(msg, "Entry: {:.2} (underlying)", signal.entry);
    let _ = writeln!(msg, "Stop: {:.2}", signal.stop_loss);

    let targets: Vec<String> = signal
        .targets
        .iter()
        .map(|t| {
            if risk_per_unit > 0.0 {
                format!("{:.2} ({:.1}R)", t, (t - signal.entry).abs() / risk_per_unit)
            } else {
                format!("{:.2}", t)
            }
        })
        .collect();
    let _ = writeln!(msg, "Targets: {}", targets.join(" / "));
    let _ = writeln!(
        msg,
        "Size: {} lots ({} qty), risk ₹{:.0}",
        signal.position.lots, signal.position.quantity, signal.risk_amount
    );
    let _ = writeln!(msg, "Expiry: {}", signal.contract.expiry.format("%d %b %Y"));

    if !signal.reasons.is_empty() {
        msg.push_str("Why:\n");
        for reason in &signal.reasons {
            let _ = writeln!(msg, "  • {}", reason);
        }
    }
    msg.trim_end().to_string()
}

pub fn format_daily_summary(summary: &DailySummary) -> String {
    let status = match summary.status {
        RiskStatus::Active => "active".to_string(),
        RiskStatus::Paused(reason) => format!("paused ({})", reason),
    };
    format!(
        "📊 Daily summary {}\nSignals: {}/{}\nConsecutive losses: {}\nStatus: {}",
        summary.date,
        summary.signals_sent,
        summary.daily_max_signals,
        summary.consecutive_losses,
        status
    )
}
