#![cfg(not(tarpaulin_include))]

use dealer_price::RawRow;
use dealer_price::config::Settings;
use dealer_price::login::{EMAIL_COLUMN, NAME_COLUMN, PASSWORD_COLUMN, hash_password};
use dealer_price::store::{CsvSheetStore, SheetStore};

/// Print the hash to paste into the password column of the Users table.
///
/// Usage:
///   hash_password <password>
///   hash_password <password> --add <email> <name>   (also appends the user)
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 && !(args.len() == 5 && args[2] == "--add") {
        eprintln!("Usage: {} <password> [--add <email> <name>]", args[0]);
        return Ok(());
    }

    let hash = hash_password(&args[1])?;
    println!("Paste this into the password column of the Users table:");
    println!("{}", "-".repeat(30));
    println!("{}", hash);
    println!("{}", "-".repeat(30));

    if args.len() == 5 {
        let settings = Settings::load(None)?;
        let store = CsvSheetStore::new(&settings.sheets.data_dir)?;
        let mut row = RawRow::new();
        row.insert(EMAIL_COLUMN.to_string(), args[3].trim().to_string());
        row.insert(PASSWORD_COLUMN.to_string(), hash);
        row.insert(NAME_COLUMN.to_string(), args[4].trim().to_string());
        store.append_row(&settings.sheets.users_table, row)?;
        println!("Added {} to table '{}'", args[3].trim(), settings.sheets.users_table);
    }
    Ok(())
}
