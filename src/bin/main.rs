// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use crossbeam::channel::{self, Receiver, Sender};
use csv::{ReaderBuilder, Trim, Writer};
use point_ledger_rs::{EngineConfig, PointEngine, TransactionKind, UserId};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Point Ledger - Replay charge/use CSV files
///
/// Applies every command of a CSV file to a fresh point engine and writes the
/// resulting balances to stdout. Commands of the same user are applied in file
/// order; different users are processed in parallel.
#[derive(Parser, Debug)]
#[command(name = "point-ledger-rs")]
#[command(about = "Replays point charge/use commands and prints balances", long_about = None)]
struct Args {
    /// Path to CSV file with commands
    ///
    /// Expected format: type,user,amount
    /// Example: cargo run -- commands.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Number of worker threads
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Maximum balance per user (overrides POINT_MAX_BALANCE)
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
    max_balance: Option<i64>,

    /// Lock wait in milliseconds (overrides POINT_LOCK_TIMEOUT_MS)
    #[arg(long)]
    lock_timeout_ms: Option<u64>,
}

fn main() {
    // Logs go to stderr so stdout stays a clean CSV.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::from_env();
    if let Some(max_balance) = args.max_balance {
        config = config.with_max_balance(max_balance);
    }
    if let Some(ms) = args.lock_timeout_ms {
        config = config.with_lock_timeout(Duration::from_millis(ms));
    }
    tracing::info!(
        max_balance = config.max_balance,
        lock_timeout = ?config.lock_timeout,
        unknown_user = ?config.unknown_user,
        workers = args.workers,
        "configuration loaded"
    );

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(path = %args.input.display(), error = %e, "cannot open input file");
            process::exit(1);
        }
    };

    let engine = PointEngine::with_config(config);
    match replay_commands(BufReader::new(file), &engine, args.workers) {
        Ok(summary) => tracing::info!(
            applied = summary.applied,
            rejected = summary.rejected,
            malformed = summary.malformed,
            "replay finished"
        ),
        Err(e) => {
            tracing::error!(error = %e, "cannot read commands");
            process::exit(1);
        }
    }

    if let Err(e) = write_balances(&engine, std::io::stdout()) {
        tracing::error!(error = %e, "cannot write balances");
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, user, amount`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    command: String,
    user: i64,
    amount: i64,
}

/// A parsed command ready for the engine.
#[derive(Debug, Clone, Copy)]
struct Command {
    user_id: UserId,
    kind: TransactionKind,
    amount: i64,
}

impl CsvRecord {
    /// Returns `None` for unknown command types.
    fn into_command(self) -> Option<Command> {
        let kind = match self.command.to_lowercase().as_str() {
            "charge" => TransactionKind::Charge,
            "use" => TransactionKind::Use,
            _ => return None,
        };
        Some(Command {
            user_id: UserId(self.user),
            kind,
            amount: self.amount,
        })
    }
}

/// Counters reported after a replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ReplaySummary {
    applied: usize,
    rejected: usize,
    malformed: usize,
}

/// Replays commands from a CSV reader against `engine`.
///
/// Commands are sharded by user onto `workers` threads through channels, so
/// each user's commands keep file order while different users run in
/// parallel. Malformed rows and rejected commands are skipped and logged at
/// debug level.
///
/// # CSV Format
///
/// ```csv
/// type,user,amount
/// charge,1,1000
/// use,1,500
/// ```
///
/// # Errors
///
/// Returns a CSV error if the header cannot be read.
fn replay_commands<R: Read>(
    reader: R,
    engine: &PointEngine,
    workers: usize,
) -> Result<ReplaySummary, csv::Error> {
    let workers = workers.max(1);
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);
    // Fail early on an unreadable header rather than skipping every row.
    rdr.headers()?;

    thread::scope(|scope| {
        let (senders, handles): (Vec<Sender<Command>>, Vec<_>) = (0..workers)
            .map(|_| {
                let (tx, rx) = channel::unbounded();
                let handle = scope.spawn(move || run_worker(engine, rx));
                (tx, handle)
            })
            .unzip();

        let (mut malformed, mut undelivered) = (0, 0);
        for result in rdr.deserialize::<CsvRecord>() {
            let command = match result.map(CsvRecord::into_command) {
                Ok(Some(command)) => command,
                Ok(None) => {
                    tracing::debug!("skipping unknown command type");
                    malformed += 1;
                    continue;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed row");
                    malformed += 1;
                    continue;
                }
            };
            if !dispatch(&senders, command) {
                undelivered += 1;
            }
        }
        drop(senders);

        let mut summary = ReplaySummary {
            rejected: undelivered,
            malformed,
            ..ReplaySummary::default()
        };
        for handle in handles {
            let (applied, rejected) = handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e));
            summary.applied += applied;
            summary.rejected += rejected;
        }
        Ok(summary)
    })
}

/// Routes a command to the worker owning its user; returns `false` if that
/// worker is gone.
fn dispatch(senders: &[Sender<Command>], command: Command) -> bool {
    let shard = command.user_id.0.rem_euclid(senders.len() as i64) as usize;
    match senders[shard].send(command) {
        Ok(()) => true,
        Err(e) => {
            let command = e.into_inner();
            tracing::warn!(
                user_id = %command.user_id,
                kind = %command.kind,
                amount = command.amount,
                shard,
                "worker stopped, command not applied"
            );
            false
        }
    }
}

/// Applies commands until the channel closes; returns `(applied, rejected)`.
fn run_worker(engine: &PointEngine, commands: Receiver<Command>) -> (usize, usize) {
    let (mut applied, mut rejected) = (0, 0);
    for command in commands {
        let result = match command.kind {
            TransactionKind::Charge => engine.charge(command.user_id, command.amount),
            TransactionKind::Use => engine.use_points(command.user_id, command.amount),
        };
        match result {
            Ok(_) => applied += 1,
            Err(e) => {
                tracing::debug!(user_id = %command.user_id, kind = %command.kind, amount = command.amount, error = %e, "skipping command");
                rejected += 1;
            }
        }
    }
    (applied, rejected)
}

#[derive(Debug, Serialize)]
struct BalanceRow {
    user: UserId,
    point: i64,
    updated_at: i64,
    transactions: usize,
}

/// Writes every known balance, ordered by user.
///
/// # CSV Format
///
/// Columns: `user, point, updated_at, transactions`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
fn write_balances<W: Write>(engine: &PointEngine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for balance in engine.balances().snapshot() {
        let transactions = engine
            .history(balance.user_id)
            .map(|history| history.len())
            .unwrap_or_default();
        wtr.serialize(BalanceRow {
            user: balance.user_id,
            point: balance.point,
            updated_at: balance.updated_at,
            transactions,
        })?;
    }

    wtr.flush()?;
    Ok(())
}
