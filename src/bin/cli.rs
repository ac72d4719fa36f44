use chrono::Utc;
use clap::Parser;
use env_logger::Env;
use log::error;
use serde_json::json;
use std::io::{self, Write};
use std::process::ExitCode;

use tabdeck::config::CliArgs;
use tabdeck::decoder::decode_path;
use tabdeck::normalizer::{BatchData, UploadBatch, normalize};
use tabdeck::render::{DetailDecision, RenderDecision, RenderedField, render_card, render_detail};
use tabdeck::store::{FileGroup, RecordStore, SearchInput, count_records};

fn write_card(out: &mut impl Write, fields: &[RenderedField], depth: usize) -> io::Result<()> {
    let indent = "  ".repeat(depth);
    for field in fields {
        match &field.decision {
            RenderDecision::Suppressed => {}
            RenderDecision::PlainText(text) | RenderDecision::Timestamp(text) => {
                writeln!(out, "{}{}: {}", indent, field.label, text)?
            }
            RenderDecision::Link(url) => writeln!(out, "{}{}: <{}>", indent, field.label, url)?,
            RenderDecision::PreformattedJson(text) => {
                writeln!(out, "{}{}:", indent, field.label)?;
                for line in text.lines() {
                    writeln!(out, "{}  {}", indent, line)?;
                }
            }
            RenderDecision::NestedList(items) => {
                writeln!(out, "{}{}:", indent, field.label)?;
                for item in items {
                    write_card(out, item, depth + 1)?;
                }
            }
        }
    }
    Ok(())
}

fn write_text(out: &mut impl Write, groups: &[FileGroup], detail: bool) -> io::Result<()> {
    for group in groups {
        writeln!(out, "== {} ({} records)", group.file_name, group.records.len())?;
        for (index, record) in group.records.iter().enumerate() {
            writeln!(out, "-- #{}", index)?;
            if detail {
                for field in render_detail(record) {
                    match field.decision {
                        DetailDecision::Image(url) => writeln!(out, "{}: [image] {}", field.label, url)?,
                        DetailDecision::Timestamp(text) | DetailDecision::Text(text) => {
                            writeln!(out, "{}: {}", field.label, text)?
                        }
                    }
                }
            } else {
                write_card(out, &render_card(record), 0)?;
            }
        }
    }
    writeln!(out, "{} records in {} files", count_records(groups), groups.len())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args = CliArgs::parse();

    let mut groups = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let rows = match decode_path(path) {
            Ok(rows) => rows,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        };
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let batch = UploadBatch::new(Utc::now(), BatchData::Rows(rows));
        groups.push(FileGroup::new(file_name, normalize(&[batch])));
    }

    let mut records = RecordStore::new();
    records.load(groups);
    let mut input = SearchInput::default();
    if let Some(query) = args.search {
        input.set_draft(query);
    }
    let visible = records.commit_search(&input);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let written = if args.json {
        let rendered: Vec<_> = visible
            .iter()
            .map(|group| {
                let records: Vec<_> = if args.detail {
                    group.records.iter().map(|r| json!(render_detail(r))).collect()
                } else {
                    group.records.iter().map(|r| json!(render_card(r))).collect()
                };
                json!({ "fileName": group.file_name, "records": records })
            })
            .collect();
        serde_json::to_writer_pretty(&mut out, &rendered)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(out))
    } else {
        write_text(&mut out, visible, args.detail)
    };

    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to write output: {}", e);
            ExitCode::FAILURE
        }
    }
}
