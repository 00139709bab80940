//! A simple CLI tool for inspecting the voting contract.
//! This reads the same configuration as the server and talks to the ledger
//! node directly, so operators can check on votes without going through the
//! API.

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rocket::figment::Figment;

use evote_backend::config::{Config, LedgerConfig};
use evote_backend::ledger::{EthLedger, Ledger, LedgerError, TxHash, VoterKey};
use evote_backend::model::election::{ChoiceId, ElectionId};

const PROGRAM_NAME: &str = "ledger-cli";

const ABOUT_TEXT: &str = "Inspect the on-chain voting contract.

Configuration is read from Rocket.toml and ROCKET_* environment variables,
exactly as the server reads it.

EXIT CODES:
     0: Query succeeded.
 Other: Error.";

const CHECK_VOTED: &str = "check-voted";
const RESULTS: &str = "results";
const CHECK_TX: &str = "check-tx";

const PESEL: &str = "PESEL";
const ELECTION_ID: &str = "ELECTION_ID";
const CHOICE_ID: &str = "CHOICE_ID";
const TX_HASH: &str = "TX_HASH";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    let election_id = Arg::new(ELECTION_ID)
        .help("The election to query")
        .value_parser(value_parser!(ElectionId))
        .action(ArgAction::Set)
        .required(true);

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .subcommand_required(true)
        .subcommand(
            Command::new(CHECK_VOTED)
                .about("Check whether a voter has voted in an election")
                .arg(
                    Arg::new(PESEL)
                        .help("The voter's PESEL")
                        .action(ArgAction::Set)
                        .required(true),
                )
                .arg(election_id.clone()),
        )
        .subcommand(
            Command::new(RESULTS)
                .about("Print the vote count for each given choice")
                .arg(election_id)
                .arg(
                    Arg::new(CHOICE_ID)
                        .help("The choices to count")
                        .value_parser(value_parser!(ChoiceId))
                        .action(ArgAction::Append)
                        .num_args(1..)
                        .required(true),
                ),
        )
        .subcommand(
            Command::new(CHECK_TX)
                .about("Report the status of a relayed transaction")
                .arg(
                    Arg::new(TX_HASH)
                        .help("The hash returned when the vote was cast")
                        .action(ArgAction::Set)
                        .required(true),
                ),
        )
}

/// A query against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Query {
    CheckVoted {
        pesel: String,
        election_id: ElectionId,
    },
    Results {
        election_id: ElectionId,
        choices: Vec<ChoiceId>,
    },
    CheckTx(TxHash),
}

impl Query {
    /// Interpret parsed arguments. Required arguments are guaranteed to be
    /// present by `cli`.
    fn from_args(args: &ArgMatches) -> Self {
        match args.subcommand() {
            Some((CHECK_VOTED, sub)) => Self::CheckVoted {
                pesel: sub.get_one::<String>(PESEL).unwrap().clone(),
                election_id: *sub.get_one(ELECTION_ID).unwrap(),
            },
            Some((RESULTS, sub)) => Self::Results {
                election_id: *sub.get_one(ELECTION_ID).unwrap(),
                choices: sub.get_many(CHOICE_ID).unwrap().copied().collect(),
            },
            Some((CHECK_TX, sub)) => {
                Self::CheckTx(TxHash(sub.get_one::<String>(TX_HASH).unwrap().clone()))
            }
            _ => unreachable!("subcommand is required"),
        }
    }
}

/// Run the query and print its outcome.
async fn query(query: &Query, figment: &Figment, ledger: &EthLedger) -> Result<(), String> {
    match query {
        Query::CheckVoted { pesel, election_id } => {
            let config: Config = figment.extract().map_err(|e| e.to_string())?;
            let key = VoterKey::derive(pesel, *election_id, config.secret_salt());
            let voted = ledger.has_voted(&key).await.map_err(describe)?;
            println!(
                "Voter key {key} {} voted in election {election_id}.",
                if voted { "has" } else { "has not" }
            );
        }
        Query::Results {
            election_id,
            choices,
        } => {
            for choice_id in choices {
                let count = ledger
                    .choice_count(*election_id, *choice_id)
                    .await
                    .map_err(describe)?;
                println!(
                    "Choice {choice_id}: {count} vote{}",
                    if count != 1 { "s" } else { "" }
                );
            }
        }
        Query::CheckTx(hash) => match ledger.transaction_receipt(hash).await.map_err(describe)? {
            Some(status) => println!(
                "Transaction {hash} {} in block {} at index {} ({} gas, {} log{}).",
                if status.succeeded { "succeeded" } else { "failed" },
                status.block_number,
                status.transaction_index,
                status.gas_used,
                status.logs,
                if status.logs != 1 { "s" } else { "" }
            ),
            None => println!("Transaction {hash} is pending or unknown."),
        },
    }
    Ok(())
}

fn describe(err: LedgerError) -> String {
    format!("Ledger error: {err}")
}

/// Load the configuration, run the query, and return the exit code.
async fn run(args: &ArgMatches, figment: &Figment) -> u8 {
    let query_to_run = Query::from_args(args);
    let ledger = match figment
        .extract::<LedgerConfig>()
        .map_err(|e| e.to_string())
        .and_then(|config| config.connect().map_err(|e| e.to_string()))
    {
        Ok(ledger) => ledger,
        Err(msg) => {
            println!("Configuration error: {msg}");
            return 1;
        }
    };
    match query(&query_to_run, figment, &ledger).await {
        Ok(()) => 0,
        Err(msg) => {
            println!("{msg}");
            1
        }
    }
}

#[rocket::main]
async fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args, &rocket::Config::figment()).await;
    std::process::exit(exit_code.into())
}
