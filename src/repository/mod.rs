#[cfg(test)]
pub mod memory;
pub mod rent_ledger;
