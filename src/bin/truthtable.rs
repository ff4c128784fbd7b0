//! Command-line front end for auditing responses and managing the knowledge base.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use truthtable_core::audit::{AuditPipeline, AuditRequest, AuditService, AuditStore};
use truthtable_core::retrieval::{
    build_vector_store, load_seed_documents, prepare_vector_store, seed_knowledge, ClientEmbedder,
    Embedder, EvidenceRetriever,
};
use truthtable_core::{build_client, AuditSettings, Error};

#[derive(Debug, Parser)]
#[command(name = "truthtable")]
#[command(about = "Audit LLM responses for unsupported claims", version)]
struct Args {
    /// Log filter (overrides LOG_LEVEL)
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Audit one response and print the outcome as JSON
    Audit {
        /// Question the response answers
        #[arg(long)]
        query: String,

        /// Response to audit
        #[arg(long)]
        response: String,

        /// Evidence document (repeatable)
        #[arg(long = "context")]
        context: Vec<String>,

        /// Caller request id (random if omitted)
        #[arg(long)]
        request_id: Option<String>,
    },
    /// Load a JSON array of {text, category?, source?} into the knowledge base
    Seed {
        file: PathBuf,
    },
    /// Check the inference backend and knowledge base
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let settings = AuditSettings::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log.as_deref().unwrap_or(&settings.log_level)))
        .with_writer(std::io::stderr)
        .init();

    let client = build_client(&settings)?;
    let embedder: Arc<dyn Embedder> = Arc::new(ClientEmbedder::new(
        client.clone(),
        &settings.embedding_model,
        settings.embedding_dimension,
    ));
    let store = build_vector_store(&settings)?;

    match args.command {
        Command::Seed { file } => {
            let store = store.ok_or_else(|| {
                Error::Config("Set QDRANT_URL or KNOWLEDGE_DB to seed a knowledge base".to_string())
            })?;
            let docs = load_seed_documents(&file)?;
            let written = seed_knowledge(embedder.as_ref(), store.as_ref(), &docs).await?;
            let total = store.count().await?;
            tracing::info!(written, total, "Seeding complete");
            println!("Stored {} documents (total in knowledge base: {})", written, total);
        }
        Command::Audit {
            query,
            response,
            context,
            request_id,
        } => {
            let store = match store {
                Some(store) => prepare_vector_store(store).await,
                None => None,
            };
            let retriever = store.map(|store| EvidenceRetriever::new(embedder, store));
            let pipeline = Arc::new(AuditPipeline::new(client, retriever));
            let mut service = AuditService::new(pipeline, Arc::new(AuditStore::new()));
            if let Some(limit) = settings.audit_timeout() {
                service = service.with_timeout(limit);
            }

            let request_id = request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let request =
                AuditRequest::new(request_id, query, response).with_context_docs(context);

            let submission = service.submit(request).await?;
            let record = service.result(&submission.audit_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Health => {
            let retriever = store.map(|store| EvidenceRetriever::new(embedder, store));
            let pipeline = Arc::new(AuditPipeline::new(client, retriever));
            let service = AuditService::new(pipeline, Arc::new(AuditStore::new()));

            let health = service.health().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
            if !health.healthy {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
