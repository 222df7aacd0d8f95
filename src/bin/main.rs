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

use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use lending_ledger_rs::{
    BookCondition, BookId, BookInfo, Engine, LendingPolicy, MemberId, MemberInfo, StaffId,
    StaffInfo, StockEntry, TransactionId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Lending Ledger - Replay library operations
///
/// Loads books and parties, applies a CSV of stock entries, checkouts, returns,
/// renewals, and fine payments, then writes the resulting transactions to stdout.
#[derive(Parser, Debug)]
#[command(name = "lending-ledger-rs")]
#[command(about = "A lending engine that replays library operation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: type,member,staff,transaction,books,date,conditions,amount,source,notes
    #[arg(value_name = "FILE")]
    operations: PathBuf,

    /// Book catalog CSV: id,isbn,title,author,publisher,publish_year,category,page_count,shelf,description
    #[arg(long, value_name = "FILE")]
    books: PathBuf,

    /// Members and staff CSV: kind,id,name,email,phone,student_id,address
    #[arg(long, value_name = "FILE")]
    parties: PathBuf,

    /// Lending policy file (TOML, JSON, YAML); LENDING_* variables override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Reference time for overdue classification (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    as_of: Option<DateTime<Utc>>,

    /// Write the overdue report instead of all transactions
    #[arg(long)]
    overdue: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lending_ledger_rs=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let policy = match LendingPolicy::load(args.config.as_deref()) {
        Ok(policy) => policy,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };
    let engine = Engine::with_policy(policy);

    let loaded = open(&args.books)
        .and_then(|file| load_books(&engine, file))
        .and_then(|books| {
            open(&args.parties)
                .and_then(|file| load_parties(&engine, file))
                .map(|parties| (books, parties))
        });
    match loaded {
        Ok((books, parties)) => tracing::info!(books, parties, "catalog and registry loaded"),
        Err(e) => {
            eprintln!("Error loading catalog: {}", e);
            process::exit(1);
        }
    }

    if let Err(e) = open(&args.operations).and_then(|file| process_operations(&engine, file)) {
        eprintln!("Error processing operations: {}", e);
        process::exit(1);
    }

    let as_of = args.as_of.unwrap_or_else(Utc::now);
    let written = if args.overdue {
        write_overdue(&engine, as_of, std::io::stdout())
    } else {
        write_transactions(&engine, as_of, std::io::stdout())
    };
    if let Err(e) = written {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn open(path: &Path) -> Result<BufReader<File>, csv::Error> {
    File::open(path).map(BufReader::new).map_err(|e| {
        csv::Error::from(std::io::Error::new(
            e.kind(),
            format!("'{}': {}", path.display(), e),
        ))
    })
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader)
}

/// Parses RFC 3339 timestamps or plain dates (taken as midnight UTC).
fn parse_date(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
        .ok_or_else(|| format!("invalid date '{value}'"))
}

/// Raw catalog row.
#[derive(Debug, Deserialize)]
struct BookRecord {
    id: u32,
    #[serde(default)]
    isbn: Option<String>,
    title: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    publish_year: Option<i32>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    page_count: Option<u32>,
    #[serde(default)]
    shelf: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Loads books into the catalog. Stock comes only from `entry` operations.
///
/// Malformed rows are skipped.
fn load_books<R: Read>(engine: &Engine, reader: R) -> Result<usize, csv::Error> {
    let mut loaded = 0;
    for result in csv_reader(reader).deserialize::<BookRecord>() {
        match result {
            Ok(row) => {
                engine.catalog().upsert_book(
                    BookId(row.id),
                    BookInfo {
                        isbn: row.isbn,
                        title: row.title,
                        author: row.author,
                        publisher: row.publisher,
                        publish_year: row.publish_year,
                        category: row.category,
                        page_count: row.page_count,
                        shelf: row.shelf,
                        description: row.description,
                    },
                );
                loaded += 1;
            }
            Err(e) => tracing::warn!("Skipping malformed book row: {}", e),
        }
    }
    Ok(loaded)
}

/// Raw party row; `kind` is `member` or `staff`.
#[derive(Debug, Deserialize)]
struct PartyRecord {
    kind: String,
    id: u32,
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

fn load_parties<R: Read>(engine: &Engine, reader: R) -> Result<usize, csv::Error> {
    let mut loaded = 0;
    for result in csv_reader(reader).deserialize::<PartyRecord>() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("Skipping malformed party row: {}", e);
                continue;
            }
        };
        match row.kind.to_lowercase().as_str() {
            "member" => {
                engine.parties().upsert_member(
                    MemberId(row.id),
                    MemberInfo {
                        student_id: row.student_id,
                        name: row.name,
                        email: row.email,
                        phone: row.phone,
                        address: row.address,
                    },
                );
            }
            "staff" => {
                engine.parties().upsert_staff(
                    StaffId(row.id),
                    StaffInfo {
                        name: row.name,
                        email: row.email,
                        phone: row.phone,
                    },
                );
            }
            other => {
                tracing::warn!("Skipping party row with unknown kind '{}'", other);
                continue;
            }
        }
        loaded += 1;
    }
    Ok(loaded)
}

/// Raw operation row matching the input format.
///
/// Fields: `type, member, staff, transaction, books, date, conditions, amount, source, notes`
#[derive(Debug, Deserialize)]
struct OperationRecord {
    #[serde(rename = "type")]
    op_type: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    member: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    staff: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    transaction: Option<u64>,
    /// Space-separated book ids.
    #[serde(default)]
    books: Option<String>,
    #[serde(default)]
    date: Option<String>,
    /// Space-separated `book:condition` pairs.
    #[serde(default)]
    conditions: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<u64>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Operation {
    Entry(StockEntry),
    Checkout {
        member: MemberId,
        staff: StaffId,
        books: Vec<BookId>,
        date: DateTime<Utc>,
        notes: Option<String>,
    },
    Return {
        transaction: TransactionId,
        conditions: HashMap<BookId, BookCondition>,
        date: DateTime<Utc>,
        notes: Option<String>,
    },
    Renew {
        transaction: TransactionId,
        date: DateTime<Utc>,
    },
    Pay {
        member: MemberId,
        amount: u64,
    },
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, String> {
    value.ok_or_else(|| format!("missing {field}"))
}

fn parse_books(value: &str) -> Result<Vec<BookId>, String> {
    value
        .split_whitespace()
        .map(|id| {
            id.parse()
                .map(BookId)
                .map_err(|_| format!("invalid book id '{id}'"))
        })
        .collect()
}

fn parse_conditions(value: &str) -> Result<HashMap<BookId, BookCondition>, String> {
    value
        .split_whitespace()
        .map(|pair| {
            let (book, condition) = pair
                .split_once(':')
                .ok_or_else(|| format!("expected book:condition, got '{pair}'"))?;
            let book = book
                .parse()
                .map(BookId)
                .map_err(|_| format!("invalid book id '{book}'"))?;
            Ok((book, condition.parse()?))
        })
        .collect()
}

impl OperationRecord {
    /// Converts a CSV record to an operation, naming the first missing or
    /// malformed field on failure.
    fn into_operation(self) -> Result<Operation, String> {
        let date = || required(self.date.as_deref(), "date").and_then(parse_date);

        match self.op_type.to_lowercase().as_str() {
            "entry" => {
                let books = parse_books(&required(self.books.clone(), "books")?)?;
                let &[book_id] = books.as_slice() else {
                    return Err("entry takes exactly one book".into());
                };
                let quantity = u32::try_from(required(self.amount, "amount")?)
                    .map_err(|_| "quantity out of range".to_string())?;
                Ok(Operation::Entry(StockEntry {
                    book_id,
                    staff_id: StaffId(required(self.staff, "staff")?),
                    quantity,
                    source: self.source.clone().unwrap_or_else(|| "Purchase".into()),
                    notes: self.notes.clone(),
                    date: date()?,
                }))
            }
            "checkout" => Ok(Operation::Checkout {
                member: MemberId(required(self.member, "member")?),
                staff: StaffId(required(self.staff, "staff")?),
                books: parse_books(&required(self.books.clone(), "books")?)?,
                date: date()?,
                notes: self.notes.clone(),
            }),
            "return" => Ok(Operation::Return {
                transaction: TransactionId(required(self.transaction, "transaction")?),
                conditions: parse_conditions(&required(self.conditions.clone(), "conditions")?)?,
                date: date()?,
                notes: self.notes.clone(),
            }),
            "renew" => Ok(Operation::Renew {
                transaction: TransactionId(required(self.transaction, "transaction")?),
                date: date()?,
            }),
            "pay" => Ok(Operation::Pay {
                member: MemberId(required(self.member, "member")?),
                amount: required(self.amount, "amount")?,
            }),
            other => Err(format!("unknown operation '{other}'")),
        }
    }
}

/// Applies operations from a CSV reader, in order.
///
/// Rows that fail to parse or that the engine rejects are reported and
/// skipped; processing continues with the next row.
///
/// # Errors
///
/// Returns a CSV error if the reader fails.
fn process_operations<R: Read>(engine: &Engine, reader: R) -> Result<(), csv::Error> {
    for (line, result) in csv_reader(reader).deserialize::<OperationRecord>().enumerate() {
        let row = line + 2;
        let parsed = result
            .map_err(|e| e.to_string())
            .and_then(OperationRecord::into_operation);
        let operation = match parsed {
            Ok(operation) => operation,
            Err(e) => {
                tracing::warn!("Skipping row {}: {}", row, e);
                continue;
            }
        };

        let outcome = match operation {
            Operation::Entry(entry) => engine.add_entry(entry).map(|_| ()),
            Operation::Checkout {
                member,
                staff,
                books,
                date,
                notes,
            } => engine
                .checkout_with_notes(member, staff, &books, date, notes)
                .map(|tx| {
                    tracing::info!(transaction_id = %tx.id, member_id = %member, "books checked out");
                }),
            Operation::Return {
                transaction,
                conditions,
                date,
                notes,
            } => engine
                .return_books_with_notes(transaction, &conditions, date, notes)
                .map(|tx| {
                    tracing::info!(transaction_id = %tx.id, fine = tx.fine, "books returned");
                }),
            Operation::Renew { transaction, date } => engine.renew(transaction, date).map(|_| ()),
            Operation::Pay { member, amount } => engine.settle_fine(member, amount).map(|_| ()),
        };
        if let Err(e) = outcome {
            tracing::warn!("Rejected row {}: {}", row, e);
        }
    }
    Ok(())
}

/// Flat transaction row for CSV output.
#[derive(Debug, Serialize)]
struct TransactionRow {
    transaction: TransactionId,
    member: MemberId,
    staff: StaffId,
    borrow_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    status: String,
    fine: u64,
    renewals: u32,
    books: String,
    notes: Option<String>,
}

/// Writes every transaction as CSV, classifying overdue loans at `as_of`.
///
/// # CSV Format
///
/// Columns: `transaction, member, staff, borrow_date, due_date, return_date,
/// status, fine, renewals, books, notes`; `books` lists `id` or `id:CONDITION`
/// pairs.
fn write_transactions<W: Write>(
    engine: &Engine,
    as_of: DateTime<Utc>,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for tx in engine.transactions() {
        let books = tx
            .details
            .iter()
            .map(|detail| match detail.book_condition {
                Some(condition) => format!("{}:{}", detail.book_id, condition),
                None => detail.book_id.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        wtr.serialize(TransactionRow {
            transaction: tx.id,
            member: tx.member_id,
            staff: tx.staff_id,
            borrow_date: tx.borrow_date,
            due_date: tx.due_date,
            return_date: tx.return_date,
            status: tx.status_at(as_of).to_string(),
            fine: tx.fine,
            renewals: tx.renewals,
            books,
            notes: tx.notes,
        })?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes the overdue report at `as_of` as CSV.
fn write_overdue<W: Write>(
    engine: &Engine,
    as_of: DateTime<Utc>,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for loan in engine.overdue_report(as_of) {
        wtr.serialize(&loan)?;
    }
    wtr.flush()?;
    Ok(())
}
