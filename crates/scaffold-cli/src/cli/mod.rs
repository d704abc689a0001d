/*
[INPUT]:  Parsed subcommands from main
[OUTPUT]: Subcommand implementations
[POS]:    CLI layer - binary-only modules
[UPDATE]: When adding a subcommand
*/

pub mod init;
pub mod run;
