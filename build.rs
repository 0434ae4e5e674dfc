//! Build script
//!
//! `sqlx::migrate!` embeds the SQL files at compile time, so cargo has to
//! rebuild the crate whenever a migration is added or edited.

fn main() {
    println!("cargo:rerun-if-changed=migrations");
}
