//! Example: Rolling audit writer
//!
//! Configures a writer from flat properties, writes a few batches across a
//! scheduled rollover and lists the resulting files.

use auditrail_core::{Result, WriterConfig};
use auditrail_file_log::AuditWriter;
use std::collections::HashMap;
use std::time::Duration;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let _ = std::fs::remove_dir_all("./tmp/audit");

    let props: HashMap<String, String> = [
        ("xasecure.audit.destination.directory", "./tmp/audit"),
        ("xasecure.audit.destination.subdirectory", "{app_type}/{time:%Y%m%d}"),
        ("xasecure.audit.destination.fileNameTemplate", "{app_type}_audit_{hostname}.log"),
        ("xasecure.audit.destination.appType", "hdfs"),
        ("xasecure.audit.rollover.enabled", "true"),
        ("xasecure.audit.rollover.intervalSeconds", "2"),
        ("xasecure.audit.rollover.checkPeriodSeconds", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let config = WriterConfig::from_properties("xasecure.audit", &props)?;
    let writer = AuditWriter::builder(config).build()?;

    for round in 0..3 {
        let lines: Vec<String> = (0..5)
            .map(|i| {
                serde_json::json!({
                    "reqUser": "alice",
                    "access": "read",
                    "resource": format!("/data/file-{}", i),
                    "seq_num": round * 5 + i,
                })
                .to_string()
            })
            .collect();

        if writer.log_json(&lines) {
            tracing::info!(round, path = ?writer.current_path(), "Batch written");
        } else {
            tracing::warn!(round, "Batch not durably written");
        }
        std::thread::sleep(Duration::from_millis(1500));
    }

    writer.close_writer();

    for entry in walk("./tmp/audit")? {
        tracing::info!(file = %entry.display(), "Audit file");
    }
    Ok(())
}

fn walk(dir: &str) -> Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![std::path::PathBuf::from(dir)];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
