//! Integration suite: ledger + resolver end to end against a scripted
//! oracle, on real SQLite files.

mod ledger_flow;
mod mock_oracle;
mod simulation;
