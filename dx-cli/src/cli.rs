//! Command-line arguments for `dx`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dx_rag::{CorpusFormat, DEFAULT_COLLECTION, RebuildMode};

#[derive(Parser, Debug)]
#[command(name = "dx")]
#[command(about = "Retrieval-augmented ICD-10 diagnosis over clinical protocols", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub index: IndexArgs,

    #[command(flatten)]
    pub embedding: EmbeddingArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the corpus, chunk and embed it, and write the index
    BuildIndex {
        /// Directory of *.json protocols or a *.jsonl file
        #[arg(long, env = "DX_CORPUS")]
        corpus: PathBuf,

        /// Corpus layout
        #[arg(long, value_enum, env = "DX_CORPUS_FORMAT", default_value_t = FormatArg::Dir)]
        format: FormatArg,

        /// What to do with an existing collection
        #[arg(long, value_enum, env = "DX_REBUILD_MODE", default_value_t = ModeArg::Recreate)]
        mode: ModeArg,

        /// Characters per chunk
        #[arg(long, env = "DX_CHUNK_SIZE", default_value_t = 500)]
        chunk_size: usize,

        /// Characters shared by consecutive chunks
        #[arg(long, env = "DX_CHUNK_OVERLAP", default_value_t = 50)]
        chunk_overlap: usize,

        /// Entries per write
        #[arg(long, env = "DX_BATCH_SIZE", default_value_t = 5000)]
        batch_size: usize,
    },

    /// Serve the diagnosis API and the index page
    Serve(ServeArgs),

    /// List collections with entry counts and a sample document
    Status,

    /// Print the chunks nearest to a query
    Query {
        /// Free-text query
        text: String,

        /// Number of results
        #[arg(short, long, default_value_t = 3)]
        k: usize,
    },
}

/// Where the index lives.
#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    /// Index directory
    #[arg(long, global = true, env = "DX_DB_DIR", default_value = "data/index")]
    pub db_dir: PathBuf,

    /// Collection name
    #[arg(long, global = true, env = "DX_COLLECTION", default_value = DEFAULT_COLLECTION)]
    pub collection: String,
}

/// Which embedding function to use. Must match between build and query.
#[derive(Args, Debug, Clone)]
pub struct EmbeddingArgs {
    /// Embedding backend
    #[arg(long, global = true, value_enum, env = "DX_EMBEDDER", default_value_t = EmbedderKind::Minilm)]
    pub embedder: EmbedderKind,

    /// Where the local model is downloaded and cached
    #[arg(long, global = true, env = "DX_MODEL_CACHE_DIR")]
    pub model_cache_dir: Option<PathBuf>,

    /// Vector size for the hashing embedder, or requested size for remote models
    #[arg(long, global = true, env = "DX_EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// Remote embedding model
    #[arg(long, global = true, env = "DX_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Base URL of an OpenAI-compatible embeddings API
    #[arg(long, global = true, env = "DX_EMBEDDING_BASE_URL")]
    pub embedding_base_url: Option<String>,

    /// API key for the remote embedding backend
    #[arg(long, global = true, env = "DX_EMBEDDING_API_KEY", hide_env_values = true)]
    pub embedding_api_key: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Bind address
    #[arg(long, env = "DX_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Bind port
    #[arg(long, env = "DX_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory holding index.html
    #[arg(long, env = "DX_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Chunks retrieved per request
    #[arg(long, env = "DX_TOP_K", default_value_t = dx_server::DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Cap on the context block, in characters
    #[arg(long, env = "DX_MAX_CONTEXT_CHARS", default_value_t = dx_model::prompt::DEFAULT_MAX_CONTEXT_CHARS)]
    pub max_context_chars: usize,

    /// Bearer token for the chat-completions endpoint
    #[arg(long, env = "DX_LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: String,

    /// Base URL of the chat-completions API
    #[arg(long, env = "DX_LLM_BASE_URL", default_value = dx_model::config::DEFAULT_BASE_URL)]
    pub llm_base_url: String,

    /// Chat model name
    #[arg(long, env = "DX_LLM_MODEL", default_value = dx_model::config::DEFAULT_MODEL)]
    pub llm_model: String,

    /// Completion token limit
    #[arg(long, env = "DX_LLM_MAX_TOKENS", default_value_t = dx_model::config::DEFAULT_MAX_TOKENS)]
    pub llm_max_tokens: u32,

    /// Request timeout for the chat model, in seconds
    #[arg(long, env = "DX_LLM_TIMEOUT_SECS", default_value_t = 60)]
    pub llm_timeout_secs: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// Local all-MiniLM-L6-v2 sentence model
    Minilm,
    /// Local feature-hashing embedder, lexical only
    Hashing,
    /// OpenAI-compatible /embeddings endpoint
    Openai,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Dir,
    Jsonl,
}

impl From<FormatArg> for CorpusFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Dir => CorpusFormat::Directory,
            FormatArg::Jsonl => CorpusFormat::JsonLines,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Recreate,
    Append,
}

impl From<ModeArg> for RebuildMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Recreate => RebuildMode::Recreate,
            ModeArg::Append => RebuildMode::Append,
        }
    }
}
