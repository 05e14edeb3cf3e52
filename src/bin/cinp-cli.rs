use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use cinp_client::{CinpClient, ListRequest};

#[derive(Parser)]
#[command(name = "cinp-cli")]
#[command(about = "Command line client for resource protocol servers", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, default_value = "/api/")]
    root: String,

    #[arg(long, requires = "auth_token")]
    auth_id: Option<String>,

    #[arg(long, requires = "auth_id")]
    auth_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe a namespace, model or action
    Describe { uri: String },
    /// List object URIs of a model
    List {
        uri: String,
        #[arg(short, long)]
        filter: Option<String>,
        /// Filter values as a JSON object
        #[arg(long)]
        values: Option<String>,
        #[arg(long, default_value_t = 0)]
        position: usize,
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    /// Fetch one or more objects
    Get {
        uri: String,
        #[arg(short, long)]
        multi: bool,
    },
    /// Create an object from a JSON object of values
    Create { uri: String, values: String },
    /// Update one or more objects from a JSON object of values
    Update {
        uri: String,
        values: String,
        #[arg(short, long)]
        multi: bool,
    },
    /// Delete one or more objects
    Delete { uri: String },
    /// Call an action with a JSON object of parameters
    Call {
        uri: String,
        #[arg(default_value = "{}")]
        args: String,
        #[arg(short, long)]
        multi: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut client = CinpClient::new(&cli.url, &cli.root)?;
    if let (Some(auth_id), Some(auth_token)) = (cli.auth_id, cli.auth_token) {
        client.set_auth(Some((auth_id, auth_token)));
    }

    let output = match cli.command {
        Commands::Describe { uri } => client.describe(&uri).await?,
        Commands::List {
            uri,
            filter,
            values,
            position,
            count,
        } => {
            let mut request = ListRequest::new().page(position, count);
            if let Some(filter) = filter {
                let values = match values {
                    Some(values) => parse_object(&values)?,
                    None => Map::new(),
                };
                request = request.filter(filter, values);
            }
            let result = client.list(&uri, &request).await?;
            serde_json::json!({
                "ids": result.ids,
                "position": result.page.position,
                "count": result.page.count,
                "total": result.page.total,
            })
        }
        Commands::Get { uri, multi } => client.get(&uri, multi).await?,
        Commands::Create { uri, values } => {
            let (object_id, values) = client.create(&uri, parse_object(&values)?).await?;
            serde_json::json!({ "id": object_id, "values": values })
        }
        Commands::Update { uri, values, multi } => {
            client.update(&uri, parse_object(&values)?, multi).await?
        }
        Commands::Delete { uri } => {
            client.delete(&uri).await?;
            Value::Bool(true)
        }
        Commands::Call { uri, args, multi } => client.call(&uri, parse_object(&args)?, multi).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn parse_object(text: &str) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        _ => Err("expected a JSON object".into()),
    }
}
