use clap::{Parser, Subcommand};
use ehr_core::constants::{DEFAULT_NODE_TIMEOUT_MS, DEFAULT_NODE_URL};
use ehr_core::SeedData;
use ehr_types::Urn;
use node_client::{
    AuthApi, ConsentQuery, ConsentStoreApi, EventStoreApi, NodeClient, RegistryApi,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ehr")]
#[command(about = "EHR consent broker CLI")]
struct Cli {
    /// Base URL of the consent node
    #[arg(long, env = "NUTS_NODE_URL", default_value = DEFAULT_NODE_URL)]
    node_url: String,
    /// Node request timeout in milliseconds
    #[arg(long, env = "NUTS_NODE_TIMEOUT_MS", default_value_t = DEFAULT_NODE_TIMEOUT_MS)]
    timeout_ms: u64,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a seed file without starting the server
    CheckSeed { path: PathBuf },
    #[command(flatten)]
    Node(NodeCommand),
}

/// Commands that talk to the consent node.
#[derive(Subcommand)]
enum NodeCommand {
    /// Look up an organisation in the registry
    Organisation {
        /// Organisation URN
        id: String,
    },
    /// Search organisations by name
    Search { query: String },
    /// List endpoints an organisation publishes
    Endpoints {
        /// Organisation URN
        id: String,
        /// Endpoint type, e.g. `urn:nuts:endpoint:consent`
        endpoint_type: String,
    },
    /// List consent-request events on the node
    Events,
    /// Show one consent-request event
    Event { job_id: String },
    /// List consent records, optionally filtered
    Consents {
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        custodian: Option<String>,
    },
    /// Ask the node whether a consent exists
    Check {
        /// Patient URN
        subject: String,
        /// Organisation URN the consent was given to
        actor: String,
        /// Organisation URN holding the record
        custodian: String,
    },
    /// Introspect an access token
    Introspect { token: String },
    /// Validate a base64 identity contract
    Contract { contract: String },
}

fn urn(value: Option<String>) -> Result<Option<Urn>, Box<dyn std::error::Error>> {
    Ok(value.as_deref().map(Urn::parse).transpose()?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::CheckSeed { path }) => match SeedData::load(&path) {
            Ok(seed) => println!(
                "Seed file is valid: {} patients, {} observations",
                seed.patients.len(),
                seed.observations.len()
            ),
            Err(e) => eprintln!("Error loading seed file: {}", e),
        },
        Some(Commands::Node(command)) => {
            let node = NodeClient::new(cli.node_url, Duration::from_millis(cli.timeout_ms))?;
            run_node_command(&node, command).await?;
        }
        None => {
            println!("Use 'ehr --help' for commands");
        }
    }

    Ok(())
}

async fn run_node_command(
    node: &NodeClient,
    command: NodeCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        NodeCommand::Organisation { id } => match node.organisation_by_id(&id).await {
            Ok(o) => println!("{}: {}", o.identifier, o.name),
            Err(e) => eprintln!("Error looking up organisation: {}", e),
        },
        NodeCommand::Search { query } => match node.search_organisations(&query).await {
            Ok(found) if found.is_empty() => println!("No organisations found."),
            Ok(found) => {
                for o in found {
                    println!("{}: {}", o.identifier, o.name);
                }
            }
            Err(e) => eprintln!("Error searching organisations: {}", e),
        },
        NodeCommand::Endpoints { id, endpoint_type } => {
            match node.endpoints_by_organisation_id(&id, &endpoint_type).await {
                Ok(endpoints) if endpoints.is_empty() => println!("No endpoints found."),
                Ok(endpoints) => {
                    for e in endpoints {
                        println!("{} {} {}", e.identifier, e.endpoint_type, e.url);
                    }
                }
                Err(e) => eprintln!("Error listing endpoints: {}", e),
            }
        }
        NodeCommand::Events => match EventStoreApi::list(node).await {
            Ok(events) if events.is_empty() => println!("No events found."),
            Ok(events) => {
                for e in events {
                    println!(
                        "{} {} [{}]",
                        e.job_id,
                        e.name,
                        e.organisation_refs.join(", ")
                    );
                }
            }
            Err(e) => eprintln!("Error listing events: {}", e),
        },
        NodeCommand::Event { job_id } => match EventStoreApi::get(node, &job_id).await {
            Ok(e) => {
                println!("Job: {}", e.job_id);
                println!("Status: {}", e.name);
                if let Some(error) = e.error {
                    println!("Error: {}", error);
                }
                println!("Organisations: {}", e.organisation_refs.join(", "));
            }
            Err(e) => eprintln!("Error fetching event: {}", e),
        },
        NodeCommand::Consents {
            subject,
            actor,
            custodian,
        } => {
            let query = ConsentQuery {
                subject: urn(subject)?,
                actor: urn(actor)?,
                custodian: urn(custodian)?,
            };
            match node.query(&query).await {
                Ok(result) => {
                    println!("{} consent records", result.total_results);
                    for r in result.results {
                        println!("{} -> {} (custodian {})", r.subject, r.actor, r.custodian);
                    }
                }
                Err(e) => eprintln!("Error querying consents: {}", e),
            }
        }
        NodeCommand::Check {
            subject,
            actor,
            custodian,
        } => {
            let (subject, actor, custodian) =
                (Urn::parse(&subject)?, Urn::parse(&actor)?, Urn::parse(&custodian)?);
            match node.check(&subject, &actor, &custodian).await {
                Ok(check) if check.is_given() => println!("Consent given"),
                Ok(check) => println!("No consent ({:?})", check.consent_given),
                Err(e) => eprintln!("Error checking consent: {}", e),
            }
        }
        NodeCommand::Introspect { token } => match node.introspect(&token).await {
            Ok(i) if !i.active => println!("Token is not active"),
            Ok(i) => {
                println!("Active");
                println!("Subject: {}", i.subject_id.as_deref().unwrap_or("-"));
                println!("Organisation: {}", i.organisation_id.as_deref().unwrap_or("-"));
                println!("Name: {}", i.name.as_deref().unwrap_or("-"));
            }
            Err(e) => eprintln!("Error introspecting token: {}", e),
        },
        NodeCommand::Contract { contract } => {
            match node.validate_identity_contract(&contract).await {
                Ok(v) if v.valid => println!(
                    "Valid, signed by {}",
                    v.signer_name().unwrap_or_else(|| "unknown".into())
                ),
                Ok(_) => println!("Invalid contract"),
                Err(e) => eprintln!("Error validating contract: {}", e),
            }
        }
    }

    Ok(())
}
