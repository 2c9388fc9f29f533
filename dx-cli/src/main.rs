use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dx_model::{ModelConfig, OpenAICompatibleClient, PromptAssembler};
use dx_rag::{
    CorpusSource, EmbeddingProvider, FileVectorStore, HashingEmbedder, Indexer, MiniLmEmbedder,
    OpenAIEmbeddingProvider, RagConfig, Retriever, VectorStore, corpus,
    local::MINILM_DIMENSIONS,
};
use dx_server::{DiagnosisService, ServerConfig, run_server};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, EmbedderKind, EmbeddingArgs, ServeArgs};

/// Characters of each document shown by `status` and `query`.
const PREVIEW_CHARS: usize = 300;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let store = Arc::new(
        FileVectorStore::open(&cli.index.db_dir)
            .await
            .with_context(|| format!("failed to open index at {}", cli.index.db_dir.display()))?,
    );

    match cli.command {
        Command::BuildIndex {
            corpus: corpus_path,
            format,
            mode,
            chunk_size,
            chunk_overlap,
            batch_size,
        } => {
            let config = RagConfig::builder()
                .chunk_size(chunk_size)
                .chunk_overlap(chunk_overlap)
                .batch_size(batch_size)
                .collection(&cli.index.collection)
                .build()?;
            let source = CorpusSource { format: format.into(), path: corpus_path };
            let records = corpus::load(&source)
                .with_context(|| format!("failed to load corpus {}", source.path.display()))?;
            info!(records = records.len(), format = %source.format, "corpus loaded");

            let indexer = Indexer::new(config, build_embedder(&cli.embedding)?, store)?;
            let written = indexer.build(&records, mode.into()).await?;
            println!(
                "Indexed {} records into {} entries in collection '{}'",
                records.len(),
                written,
                cli.index.collection
            );
        }
        Command::Serve(args) => {
            let embedder = build_embedder(&cli.embedding)?;
            serve(args, store, embedder, cli.index.collection).await?
        }
        Command::Status => status(store.as_ref()).await?,
        Command::Query { text, k } => {
            let embedder = build_embedder(&cli.embedding)?;
            let retriever = Retriever::open(store, embedder, &cli.index.collection).await?;
            let results = retriever.query(&text, k).await?;
            if results.is_empty() {
                println!("No results in collection '{}'", cli.index.collection);
            }
            for (rank, result) in results.iter().enumerate() {
                let meta = result.chunk_metadata();
                println!(
                    "#{} {} (protocol {}, codes {:?}, distance {:.4})",
                    rank + 1,
                    result.id,
                    meta.protocol_id,
                    meta.icd_codes,
                    result.distance
                );
                println!("{}\n", preview(&result.document));
            }
        }
    }

    Ok(())
}

fn build_embedder(args: &EmbeddingArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    match args.embedder {
        EmbedderKind::Minilm => {
            if let Some(dims) = args.embedding_dimensions.filter(|d| *d != MINILM_DIMENSIONS) {
                bail!("all-MiniLM-L6-v2 produces {MINILM_DIMENSIONS} dimensions, not {dims}");
            }
            Ok(Arc::new(MiniLmEmbedder::new(args.model_cache_dir.clone())?))
        }
        EmbedderKind::Hashing => {
            let embedder = match args.embedding_dimensions {
                Some(0) => bail!("--embedding-dimensions must be at least 1"),
                Some(dims) => HashingEmbedder::new(dims),
                None => HashingEmbedder::default(),
            };
            Ok(Arc::new(embedder))
        }
        EmbedderKind::Openai => {
            let mut provider = match &args.embedding_api_key {
                Some(key) => OpenAIEmbeddingProvider::new(key.clone())?,
                None => OpenAIEmbeddingProvider::from_env()?,
            };
            if let Some(base_url) = &args.embedding_base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &args.embedding_model {
                provider = provider.with_model(model.clone());
            }
            if let Some(dims) = args.embedding_dimensions {
                provider = provider.with_dimensions(dims);
            }
            Ok(Arc::new(provider))
        }
    }
}

async fn serve(
    args: ServeArgs,
    store: Arc<FileVectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
) -> Result<()> {
    let retriever = Retriever::open(store, embedder, &collection)
        .await
        .context("index is not ready; run `dx build-index` first")?;

    let model_config = ModelConfig::compatible(args.llm_api_key, args.llm_base_url, args.llm_model)
        .with_max_tokens(args.llm_max_tokens)
        .with_timeout(Duration::from_secs(args.llm_timeout_secs));
    let model = OpenAICompatibleClient::new(model_config)?;

    let assembler = PromptAssembler::new().with_max_context_chars(args.max_context_chars);
    let service =
        DiagnosisService::new(retriever, assembler, Arc::new(model)).with_top_k(args.top_k);

    let config = ServerConfig { host: args.host, port: args.port, static_dir: args.static_dir };
    run_server(config, Arc::new(service), collection).await
}

async fn status(store: &dyn VectorStore) -> Result<()> {
    let collections = store.list_collections().await?;
    if collections.is_empty() {
        println!("No collections found");
        return Ok(());
    }

    for name in collections {
        let count = store.count(&name).await?;
        let info = store.collection_info(&name).await?;
        let embedder = info.map(|i| i.signature()).unwrap_or_else(|| "unknown".to_string());
        println!("Collection '{name}': {count} entries (embedder {embedder})");

        if let Some(sample) = store.peek(&name, 1).await?.first() {
            let meta = sample.chunk_metadata();
            println!(
                "  sample {} (protocol {}, codes {:?})",
                sample.id, meta.protocol_id, meta.icd_codes
            );
            println!("  {}", preview(&sample.document));
        }
    }
    Ok(())
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_cuts_on_characters() {
        let text = "ж".repeat(400);
        let shown = preview(&text);
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn hashing_embedder_honours_dimensions() {
        let args = EmbeddingArgs {
            embedder: EmbedderKind::Hashing,
            model_cache_dir: None,
            embedding_dimensions: Some(64),
            embedding_model: None,
            embedding_base_url: None,
            embedding_api_key: None,
        };
        assert_eq!(build_embedder(&args).unwrap().dimensions(), 64);
    }

    #[test]
    fn minilm_rejects_other_dimensions() {
        let args = EmbeddingArgs {
            embedder: EmbedderKind::Minilm,
            model_cache_dir: None,
            embedding_dimensions: Some(128),
            embedding_model: None,
            embedding_base_url: None,
            embedding_api_key: None,
        };
        let err = build_embedder(&args).err().unwrap();
        assert!(err.to_string().contains("384"));
    }

    #[tokio::test]
    async fn status_lists_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).await.unwrap();
        status(&store).await.unwrap();
    }
}
