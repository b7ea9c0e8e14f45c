//! `tagrec` - CLI for tagrecorder
//!
//! This binary watches a USB RFID reader and inspects the tags it has
//! recorded.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::Write;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use tagrecorder::cli::{
    ClearCommand, Cli, Command, ConfigCommand, DecodeCommand, StatusCommand, TagsCommand,
    WatchCommand,
};
use tagrecorder::protocol::{decode_dump, parse_hex_dump, rssi_percent};
use tagrecorder::tag::display_time;
use tagrecorder::{
    init_logging, Config, NativeDriver, Reader, ReaderMonitor, SimulatedDriver, Storage,
    TagDriver, TagView,
};

/// Events buffered between the poll loop and the display.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Clears the terminal and homes the cursor.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    // Initialize logging based on verbosity
    init_logging(cli.verbosity(), config.logging.file.as_deref())?;

    // Execute the command
    match cli.command {
        Command::Watch(cmd) => handle_watch(&config, &cmd),
        Command::Tags(cmd) => handle_tags(&config, &cmd),
        Command::Status(cmd) => handle_status(&config, &cmd),
        Command::Devices => handle_devices(&config),
        Command::Clear(cmd) => handle_clear(&config, &cmd),
        Command::Decode(cmd) => handle_decode(&cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("opening tag database {}", path.display()))
}

fn handle_watch(config: &Config, cmd: &WatchCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let mut view = TagView::new(config.display.max_rows);
    view.load_history(&storage.all_tags()?);

    let device_index = cmd.device.unwrap_or(config.reader.device_index);
    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;

    if cmd.simulate {
        info!("Using simulated reader");
        runtime.block_on(watch(SimulatedDriver::new(), storage, view, config, device_index))
    } else {
        let library = config.library_path();
        let driver = NativeDriver::load(&library).with_context(|| {
            format!("Error initializing reader from {}", library.display())
        })?;
        runtime.block_on(watch(driver, storage, view, config, device_index))
    }
}

async fn watch<D>(
    driver: D,
    storage: Storage,
    mut view: TagView,
    config: &Config,
    device_index: u32,
) -> anyhow::Result<()>
where
    D: TagDriver + 'static,
{
    let reader = Reader::new(driver, config.reader.reader_id.clone());
    let monitor =
        ReaderMonitor::new(reader, storage, config.poll_interval()).device_index(device_index);
    let handle = monitor.handle();

    let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let mut task = tokio::spawn(monitor.run(tx));

    let mut refresh = tokio::time::interval(config.refresh_interval());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stopping = false;
    let mut dirty = true;

    // Keep draining while stopping so the monitor never blocks on a full channel
    let joined = loop {
        tokio::select! {
            _ = refresh.tick() => {
                while let Ok(event) = rx.try_recv() {
                    dirty |= view.apply(event);
                }
                if dirty {
                    draw(&view, config.display.clear_screen)?;
                    dirty = false;
                }
            }
            signal = &mut ctrl_c, if !stopping => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Stopping reader");
                handle.stop();
                stopping = true;
            }
            joined = &mut task => break joined,
        }
    };

    while let Some(event) = rx.recv().await {
        view.apply(event);
    }
    draw(&view, config.display.clear_screen)?;

    let summary = match joined.context("reader task failed")? {
        Ok(summary) => summary,
        Err(e) if e.is_device_unavailable() => {
            bail!("{e}. Is the reader plugged in? Try `tagrec devices`")
        }
        Err(e) => return Err(e.into()),
    };
    println!(
        "Polled {} times, {} reads, {} new tags",
        summary.polls, summary.reads, summary.new_tags
    );
    Ok(())
}

fn draw(view: &TagView, clear_screen: bool) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    if clear_screen {
        write!(stdout, "{CLEAR_SCREEN}")?;
    }
    write!(stdout, "{}", view.render())?;
    stdout.flush()?;
    Ok(())
}

fn handle_tags(config: &Config, cmd: &TagsCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let tags = match cmd.limit {
        Some(limit) => storage.recent(limit)?,
        None => storage.all_tags()?,
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
        return Ok(());
    }

    if tags.is_empty() {
        println!("No tags recorded.");
        return Ok(());
    }

    let id_width = tags
        .iter()
        .map(|t| t.tag_id.len())
        .max()
        .unwrap_or(0)
        .max("Tag ID".len());
    println!(
        "{:<id_width$}  {:<23}  {:<23}  {:>7}  {:>6}",
        "Tag ID", "First Seen", "Last Seen", "Signal", "Reads"
    );
    for tag in &tags {
        println!(
            "{:<id_width$}  {:<23}  {:<23}  {:>7}  {:>6}",
            tag.tag_id,
            display_time(tag.first_seen),
            display_time(tag.last_seen),
            tag.signal_label(),
            tag.read_count
        );
    }
    Ok(())
}

fn handle_status(config: &Config, cmd: &StatusCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;
    let library = config.library_path();

    if cmd.json {
        let status = serde_json::json!({
            "database_path": storage.path(),
            "total_tags": stats.total_tags,
            "total_reads": stats.total_reads,
            "first_read": stats.first_read,
            "last_read": stats.last_read,
            "db_size_bytes": stats.db_size_bytes,
            "library_path": library,
            "library_found": library.exists(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        let never = || "never".to_string();
        println!("tagrec status");
        println!("-------------");
        println!("Database:      {}", storage.path().display());
        println!("Total tags:    {}", stats.total_tags);
        println!("Total reads:   {}", stats.total_reads);
        println!(
            "First read:    {}",
            stats.first_read.map_or_else(never, display_time)
        );
        println!(
            "Last read:     {}",
            stats.last_read.map_or_else(never, display_time)
        );
        println!("Database size: {} bytes", stats.db_size_bytes);
        println!(
            "Driver:        {}{}",
            library.display(),
            if library.exists() { "" } else { " (not found)" }
        );
    }
    Ok(())
}

fn handle_devices(config: &Config) -> anyhow::Result<()> {
    let library = config.library_path();
    let mut driver = NativeDriver::load(&library)
        .with_context(|| format!("Error initializing reader from {}", library.display()))?;
    let count = driver.device_count()?;
    info!(library = %driver.path().display(), count, "Counted USB devices");
    if count == 0 {
        println!("No USB Device");
    } else {
        println!("Found {count} USB device(s)");
    }
    Ok(())
}

fn handle_clear(config: &Config, cmd: &ClearCommand) -> anyhow::Result<()> {
    if !cmd.yes {
        println!("This will delete all tag data. This cannot be undone.");
        println!("Use --yes to confirm.");
        return Ok(());
    }

    let storage = open_storage(config)?;
    let removed = storage.clear()?;
    println!("Database cleared ({removed} tags removed).");
    Ok(())
}

fn handle_decode(cmd: &DecodeCommand) -> anyhow::Result<()> {
    let bytes = parse_hex_dump(&cmd.dump())?;
    let parsed = decode_dump(&bytes, cmd.length, cmd.count)?;

    if cmd.json {
        let tags: Vec<_> = parsed
            .tags
            .iter()
            .map(|tag| {
                serde_json::json!({
                    "tag_id": hex::encode(&tag.tag_id),
                    "tag_type": tag.tag_type,
                    "antenna": tag.antenna,
                    "rssi": tag.rssi,
                    "rssi_percent": rssi_percent(tag.rssi),
                })
            })
            .collect();
        let output = serde_json::json!({
            "tags": tags,
            "consumed": parsed.consumed,
            "complete": parsed.is_complete(),
            "error": parsed.error.as_ref().map(ToString::to_string),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for (index, tag) in parsed.tags.iter().enumerate() {
            println!(
                "#{index}  tag {}  type {:#x}  antenna {:#x}  rssi {:#x} ({:.1}%)",
                hex::encode(&tag.tag_id),
                tag.tag_type,
                tag.antenna,
                tag.rssi,
                rssi_percent(tag.rssi)
            );
        }
        println!(
            "{} record(s), {} of {} bytes consumed",
            parsed.tags.len(),
            parsed.consumed,
            bytes.len()
        );
        if let Some(e) = &parsed.error {
            error!(error = %e, "Decoding stopped early");
            println!("Stopped: {e}");
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Reader]");
                println!("  Driver library:     {}", config.library_path().display());
                println!("  Device index:       {}", config.reader.device_index);
                println!("  Poll interval (ms): {}", config.reader.poll_interval_ms);
                println!("  Reader id:          {}", config.reader.reader_id);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Display]");
                println!(
                    "  Refresh (ms):       {}",
                    config.display.refresh_interval_ms
                );
                println!("  Max rows:           {}", config.display.max_rows);
                println!("  Clear screen:       {}", config.display.clear_screen);
                println!();
                println!("[Logging]");
                println!(
                    "  File:               {}",
                    config
                        .logging
                        .file
                        .as_ref()
                        .map_or_else(|| "none".to_string(), |p| p.display().to_string())
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            if let Err(e) = Config::load_from(Some(path)) {
                bail!("Configuration error: {e}");
            }
            println!("Configuration is valid.");
        }
    }
    Ok(())
}
