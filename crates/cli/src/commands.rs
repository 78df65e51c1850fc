//! Implementations of the CLI subcommands.
//!
//! Commands that produce output take the destination writer as an
//! argument (main hands them stdout) so their output is testable, the
//! same way the datastore itself copies into a caller-supplied writer.

use std::fs;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use chrono::SecondsFormat;
use tracing::{error, info};

use stsv_core::{Datastore, FileEntry, StoreError};
use stsv_http::{BasicAuth, ServerConfig, StateServer};

fn write_entry(out: &mut impl Write, entry: &FileEntry, marker: &str) -> io::Result<()> {
    let flag = if entry.locked { marker } else { "" };
    writeln!(
        out,
        "{} {:>6} {}{}",
        entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        entry.size,
        entry.name,
        flag,
    )
}

pub(crate) fn ls(ds: &Datastore, out: &mut impl Write) -> anyhow::Result<()> {
    let mut entries = Vec::new();
    ds.walk(|entry| {
        entries.push(entry);
        true
    })?;
    for entry in &entries {
        write_entry(out, entry, " (locked)")?;
    }
    Ok(())
}

pub(crate) fn cat(
    ds: &Datastore,
    json: bool,
    names: &[String],
    out: &mut impl Write,
) -> anyhow::Result<()> {
    for name in names {
        if !json {
            ds.read(name, out)
                .with_context(|| format!("cannot read {name}"))?;
            continue;
        }
        let mut buf = Vec::new();
        ds.read(name, &mut buf)
            .with_context(|| format!("cannot read {name}"))?;
        let value: serde_json::Value = serde_json::from_slice(&buf)
            .with_context(|| format!("{name} is not valid JSON"))?;
        serde_json::to_writer(&mut *out, &value)?;
        writeln!(out)?;
    }
    Ok(())
}

pub(crate) fn put(
    ds: &Datastore,
    prefix: &str,
    lock: &str,
    no_json: bool,
    files: &[PathBuf],
) -> anyhow::Result<()> {
    for path in files {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot read file");
                continue;
            }
        };
        if !no_json && serde_json::from_slice::<serde_json::Value>(&content).is_err() {
            error!(path = %path.display(), "invalid json, skipping");
            continue;
        }
        let name = format!("{prefix}{}", path.display());
        match ds.write(&name, content.as_slice(), None, lock) {
            Ok(vid) => info!(%name, %vid, "stored"),
            Err(e) => error!(%name, error = %e, "put failed"),
        }
    }
    Ok(())
}

pub(crate) fn history(
    ds: &Datastore,
    names: &[String],
    out: &mut impl Write,
) -> anyhow::Result<()> {
    for name in names {
        writeln!(out, "{name}")?;
        for entry in ds.history(name) {
            write_entry(out, &entry, " (current)")?;
        }
    }
    Ok(())
}

pub(crate) fn hcat(
    ds: &Datastore,
    file: &str,
    vids: &[String],
    out: &mut impl Write,
) -> anyhow::Result<()> {
    for vid in vids {
        let mut reader = ds
            .read_history(file, vid)
            .with_context(|| format!("cannot read {file} version {vid}"))?;
        io::copy(&mut reader, out)?;
    }
    Ok(())
}

pub(crate) fn rollback(ds: &Datastore, file: &str, to: &str) -> anyhow::Result<()> {
    ds.rollback(file, to)
        .with_context(|| format!("cannot roll {file} back to {to}"))?;
    info!(file, to, "rolled back");
    Ok(())
}

pub(crate) fn prune(
    ds: &Datastore,
    keep: usize,
    dry_run: bool,
    all: bool,
    names: &[String],
) -> anyhow::Result<()> {
    if all {
        ds.prune_all(keep, dry_run)?;
        return Ok(());
    }
    let default_names = [String::from("/")];
    let names = if names.is_empty() { &default_names[..] } else { names };
    for name in names {
        println!("{name}");
        ds.prune(name, keep, dry_run)
            .with_context(|| format!("prune of {name} failed"))?;
    }
    Ok(())
}

pub(crate) fn edit(ds: &Datastore, name: &str, no_json: bool) -> anyhow::Result<()> {
    let mut original = Vec::new();
    ds.read(name, &mut original)
        .with_context(|| format!("cannot read {name}"))?;

    // Present JSON content pretty-printed so it is actually editable.
    let parsed: Option<serde_json::Value> = serde_json::from_slice(&original).ok();
    let display = match &parsed {
        Some(value) => serde_json::to_vec_pretty(value)?,
        None => original,
    };

    let file = tempfile::Builder::new()
        .prefix("stsv-edit-")
        .suffix(".json")
        .tempfile()?;
    fs::write(file.path(), &display)?;

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_owned());
    info!(name, %editor, "launching editor");
    let status = process::Command::new(&editor).arg(file.path()).status()?;
    anyhow::ensure!(status.success(), "editor exited with {status}");

    let edited = fs::read(file.path())?;
    if edited == display {
        info!(name, "no changes made");
        println!("{name}: not changed");
        return Ok(());
    }
    if !no_json {
        let reparsed: serde_json::Value = serde_json::from_slice(&edited)
            .context("edited content is not valid JSON")?;
        if parsed.as_ref() == Some(&reparsed) {
            info!(name, "no changes in data");
            println!("{name}: not changed");
            return Ok(());
        }
    }

    ds.write(name, edited.as_slice(), None, "")
        .map_err(|e| match e {
            StoreError::Locked => anyhow::anyhow!("{name} is locked, not writing"),
            other => other.into(),
        })?;
    info!(name, "updated");
    Ok(())
}

pub(crate) fn server(
    datastore: Datastore,
    listen: SocketAddr,
    auth: Option<&str>,
) -> anyhow::Result<()> {
    let basic_auth = auth.map(BasicAuth::parse).transpose()?;
    let config = ServerConfig {
        bind_addr: listen,
        basic_auth,
    };
    let server = StateServer::new(config, datastore);
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(server.serve())?;
    Ok(())
}
