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
use coinage::{
    AccountId, ActionEvent, ActionKind, CatalogConfig, Economy, JobId, Settings,
    default_catalog_toml,
};
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

/// Economy replay tool - process command CSV files
///
/// Replays a CSV of economy commands and action events against a fresh (or
/// configured) economy, then writes every account's balances to stdout.
#[derive(Parser, Debug)]
#[command(name = "coinage")]
#[command(about = "An economy engine that replays command CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with commands
    ///
    /// Expected format: command,account,target,amount
    /// Example: cargo run -- session.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Settings file (TOML); defaults apply when omitted
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Job catalog file (TOML); the built-in catalog applies when omitted
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => match Settings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Error loading settings '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => Settings::default(),
    };
    let catalog = match &args.catalog {
        Some(path) => match CatalogConfig::load(path) {
            Ok(catalog) => catalog,
            Err(e) => {
                eprintln!("Error loading catalog '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => match CatalogConfig::from_toml_str(default_catalog_toml()) {
            Ok(catalog) => catalog,
            Err(e) => {
                eprintln!("Error loading built-in catalog: {}", e);
                process::exit(1);
            }
        },
    };

    let (economy, _notifications) = match Economy::open(settings, &catalog) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("Error opening economy: {}", e);
            process::exit(1);
        }
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    if let Err(e) = replay_commands(&economy, BufReader::new(file)) {
        eprintln!("Error replaying commands: {}", e);
        process::exit(1);
    }

    if let Err(e) = write_balances(&economy, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `command, account, target, amount`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    command: String,
    account: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
}

/// One replayable economy command.
#[derive(Debug, Clone)]
enum Command {
    Join(AccountId),
    Leave(AccountId),
    Pay { from: AccountId, to: AccountId, amount: Decimal },
    SetBalance { account: AccountId, amount: Decimal },
    SetJob { account: AccountId, job: JobId },
    Action(ActionEvent),
    Salary,
}

impl CsvRecord {
    /// Converts a CSV record into a command.
    ///
    /// Returns `None` for unknown commands or missing required fields.
    fn into_command(self) -> Option<Command> {
        let command = self.command.to_lowercase();
        if command == "salary" {
            return Some(Command::Salary);
        }

        let account = AccountId::from_str(self.account.trim()).ok()?;
        match command.as_str() {
            "join" => Some(Command::Join(account)),
            "leave" => Some(Command::Leave(account)),
            "pay" => {
                let to = AccountId::from_str(self.target?.trim()).ok()?;
                Some(Command::Pay { from: account, to, amount: self.amount? })
            }
            "setbalance" => Some(Command::SetBalance { account, amount: self.amount? }),
            "setjob" => Some(Command::SetJob { account, job: JobId::new(&self.target?) }),
            "break" | "place" | "kill" | "catch" | "craft" => {
                let action = match command.as_str() {
                    "break" => ActionKind::Break,
                    "place" => ActionKind::Place,
                    "kill" => ActionKind::Kill,
                    "catch" => ActionKind::Catch,
                    _ => ActionKind::Craft,
                };
                Some(Command::Action(ActionEvent::new(account, action, self.target?)))
            }
            _ => None,
        }
    }
}

fn apply(economy: &Economy, command: Command) -> Result<(), coinage::EconomyError> {
    match command {
        Command::Join(account) => economy.join(account),
        Command::Leave(account) => {
            economy.leave(account);
            Ok(())
        }
        Command::Pay { from, to, amount } => economy.pay(from, to, None, amount).map(|_| ()),
        Command::SetBalance { account, amount } => {
            economy.set_balance(account, None, amount).map(|_| ())
        }
        Command::SetJob { account, job } => economy.set_job(account, &job),
        Command::Action(event) => economy.handle_action(&event).map(|_| ()),
        Command::Salary => {
            economy.pay_salaries_now();
            Ok(())
        }
    }
}

/// Replays commands from a CSV reader.
///
/// Streaming: arbitrarily large files never load fully into memory.
/// Malformed rows and failed commands (insufficient funds, unknown jobs) are
/// skipped; a replay mirrors a live session where individual commands fail
/// without stopping the server.
///
/// # CSV Format
///
/// Expected columns: `command, account, target, amount`
/// - `command`: join, leave, pay, setbalance, setjob, salary, or an action
///   kind (break, place, kill, catch, craft)
/// - `account`: account UUID (empty for `salary`)
/// - `target`: recipient UUID for pay, job name for setjob, block/entity
///   identifier for actions
/// - `amount`: decimal amount for pay and setbalance
///
/// # Errors
///
/// Returns a CSV error if the reader itself fails.
pub fn replay_commands<R: Read>(economy: &Economy, reader: R) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some(command) = record.into_command() else {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping invalid command record");
                    continue;
                };
                if let Err(e) = apply(economy, command) {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping failed command: {}", e);
                }
            }
            Err(e) => {
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed row: {}", e);
                continue;
            }
        }
    }

    Ok(())
}

/// Writes every account's balance rows as CSV.
///
/// Columns: `account, currency, balance`
pub fn write_balances<W: Write>(economy: &Economy, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(["account", "currency", "balance"])?;

    for (account, balances) in economy
        .accounts_report()
        .map_err(|e| std::io::Error::other(e.to_string()))?
    {
        for (currency, balance) in balances {
            wtr.write_record([
                account.to_string(),
                currency.to_string(),
                balance.to_string(),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    fn economy() -> Economy {
        let catalog = CatalogConfig::from_toml_str(default_catalog_toml()).unwrap();
        Economy::open(Settings::default(), &catalog).unwrap().0
    }

    const ALICE: &str = "11111111-1111-1111-1111-111111111111";
    const BOB: &str = "22222222-2222-2222-2222-222222222222";

    fn alice() -> AccountId {
        AccountId::from_str(ALICE).unwrap()
    }

    #[test]
    fn parse_join_and_pay() {
        let economy = economy();
        let csv = format!(
            "command,account,target,amount\n\
             join,{ALICE},,\n\
             join,{BOB},,\n\
             pay,{ALICE},{BOB},25.00\n"
        );
        replay_commands(&economy, Cursor::new(csv)).unwrap();

        assert_eq!(economy.balance(alice(), None).unwrap(), dec!(75.00));
        assert_eq!(
            economy.balance(AccountId::from_str(BOB).unwrap(), None).unwrap(),
            dec!(125.00)
        );
    }

    #[test]
    fn parse_setjob_and_action() {
        let economy = economy();
        let csv = format!(
            "command,account,target,amount\n\
             join,{ALICE},,\n\
             setjob,{ALICE},miner,\n\
             break,{ALICE},coal_ore,\n"
        );
        replay_commands(&economy, Cursor::new(csv)).unwrap();

        // Starting balance plus the coal ore reward.
        assert_eq!(economy.balance(alice(), None).unwrap(), dec!(100.50));
        assert_eq!(economy.job_status(alice()).unwrap().experience, 1);
    }

    #[test]
    fn parse_setbalance() {
        let economy = economy();
        let csv = format!(
            "command,account,target,amount\n\
             join,{ALICE},,\n\
             setbalance,{ALICE},,500.00\n"
        );
        replay_commands(&economy, Cursor::new(csv)).unwrap();
        assert_eq!(economy.balance(alice(), None).unwrap(), dec!(500.00));
    }

    #[test]
    fn salary_round_pays_online_workers() {
        let economy = economy();
        let csv = format!(
            "command,account,target,amount\n\
             join,{ALICE},,\n\
             setjob,{ALICE},miner,\n\
             salary,,,\n"
        );
        replay_commands(&economy, Cursor::new(csv)).unwrap();
        assert_eq!(economy.balance(alice(), None).unwrap(), dec!(110.00));
    }

    #[test]
    fn failed_commands_do_not_stop_the_replay() {
        let economy = economy();
        let csv = format!(
            "command,account,target,amount\n\
             join,{ALICE},,\n\
             pay,{ALICE},{ALICE},10.00\n\
             setjob,{ALICE},astronaut,\n\
             setbalance,{ALICE},,1.00\n"
        );
        replay_commands(&economy, Cursor::new(csv)).unwrap();
        assert_eq!(economy.balance(alice(), None).unwrap(), dec!(1.00));
        assert!(economy.job_status(alice()).unwrap().job.is_unemployed());
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let economy = economy();
        let csv = format!(
            "command,account,target,amount\n\
             join,{ALICE},,\n\
             nonsense,row,data,here\n\
             setbalance,{ALICE},,7.00\n"
        );
        replay_commands(&economy, Cursor::new(csv)).unwrap();
        assert_eq!(economy.balance(alice(), None).unwrap(), dec!(7.00));
    }

    #[test]
    fn write_balances_emits_header_and_rows() {
        let economy = economy();
        economy.join(alice()).unwrap();

        let mut output = Vec::new();
        write_balances(&economy, &mut output).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("account,currency,balance"));
        assert!(output.contains(ALICE));
        assert!(output.contains("100.00"));
    }
}
