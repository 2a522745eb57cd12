//! `beacon config`: print the effective configuration.

use anyhow::Result;
use beacon_infra::config::ConfigSource;
use beacon_types::config::{BotConfig, EnvelopeKind};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

/// Key/value rows in display order.
fn rows(config: &BotConfig) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("bot_name", config.bot_name.clone()),
        ("broker_address", config.broker_address.clone()),
        ("distributor_address", config.distributor_address.clone()),
        ("command_interval_secs", config.command_interval_secs.to_string()),
        ("settle_delay_ms", config.settle_delay_ms.to_string()),
        ("shutdown_grace_ms", config.shutdown_grace_ms.to_string()),
        ("connect_timeout_ms", config.connect_timeout_ms.to_string()),
        ("subscribe_topic", display_topic(&config.subscribe_topic)),
        ("alert_topic", config.alert_topic.clone()),
        ("framing", config.framing.to_string()),
        ("envelope", config.envelope.to_string()),
    ];
    if let EnvelopeKind::Command { args, .. } = &config.envelope
        && !args.is_empty()
    {
        let args = args
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        rows.push(("envelope.args", args));
    }
    rows
}

fn display_topic(topic: &str) -> String {
    if topic.is_empty() {
        "(all topics)".to_string()
    } else {
        topic.to_string()
    }
}

pub fn show_config(config: &BotConfig, source: &ConfigSource, json: bool) -> Result<()> {
    if json {
        let out = serde_json::json!({
            "source": source.to_string(),
            "config": config,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Setting").fg(Color::White),
        Cell::new("Value").fg(Color::White),
    ]);
    for (key, value) in rows(config) {
        table.add_row(vec![Cell::new(key).fg(Color::Cyan), Cell::new(value)]);
    }

    println!();
    println!("{table}");
    println!();
    println!("  {} {}", style("Loaded from").dim(), style(source).yellow());
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn rows_cover_every_setting() {
        let rows = rows(&BotConfig::default());
        let keys: Vec<&str> = rows.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys.len(), 11);
        assert!(keys.contains(&"shutdown_grace_ms"));
        let topic = rows.iter().find(|(k, _)| *k == "subscribe_topic").unwrap();
        assert_eq!(topic.1, "(all topics)");
    }

    #[test]
    fn command_args_get_their_own_row() {
        let config = BotConfig {
            envelope: EnvelopeKind::Command {
                name: "LIST".to_string(),
                args: BTreeMap::from([("limit".to_string(), "5".to_string())]),
            },
            ..BotConfig::default()
        };
        let rows = rows(&config);
        assert_eq!(rows.last().unwrap(), &("envelope.args", "limit=5".to_string()));
    }
}
