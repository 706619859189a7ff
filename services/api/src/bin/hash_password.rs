//! services/api/src/bin/hash_password.rs
//!
//! Prints the argon2 hash to put in `OPERATOR_PASSWORD_HASH` for the password
//! given as the first argument.

use api_lib::adapters::hash_password;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let password = std::env::args()
        .nth(1)
        .ok_or("usage: hash_password <password>")?;
    let hash = hash_password(&password).map_err(|e| e.to_string())?;
    println!("{hash}");
    Ok(())
}
