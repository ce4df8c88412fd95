//! CLI `query` command: answer a question from the indexed documents.

use std::io::Write;

use anyhow::{Context, Result};

use ragsync::config::RagsyncConfig;
use ragsync::embedding;
use ragsync::generation::{Generation, GenerationClient, OllamaProvider};
use ragsync::query::{PromptAssembler, QueryPipeline, RetrievalEngine};
use ragsync::sync::BatchEmbedder;

use super::open_store;

/// Asked when no question is given on the command line.
pub const DEFAULT_QUESTION: &str =
    "What movies are about an animal trying to accomplish something great?";

pub async fn query(
    config: &RagsyncConfig,
    question: Option<String>,
    top_k: Option<usize>,
    stream: bool,
) -> Result<()> {
    let question = question
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_QUESTION.to_string());
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let stream = stream || config.generation.stream;

    let store = open_store(config)?;
    let embedder_provider =
        embedding::create_provider(&config.embedding).context("failed to create embedding provider")?;
    let generator = OllamaProvider::new(&config.generation).context("failed to create generation provider")?;

    let assembler = PromptAssembler::new(
        &config.prompt,
        &config.retrieval.display_fields,
        &config.sync.source_field,
    );
    let embedder = BatchEmbedder::new(&embedder_provider, config.retry.policy(), 1);
    let engine = RetrievalEngine::new(
        &store,
        embedder,
        &config.retrieval.index_name,
        &config.sync.vector_field,
        assembler.projection(),
    )
    .with_num_candidates(config.retrieval.num_candidates);
    let pipeline = QueryPipeline::new(engine, assembler, GenerationClient::new(generator, stream));

    println!("Question: {question}");
    let context = pipeline
        .build_context(&question, top_k)
        .await
        .context("retrieval failed")?;

    if context.documents.is_empty() {
        println!("\nNo documents retrieved. Check the vector index and field mapping.");
    } else {
        println!("\nRetrieved documents:");
        for doc in &context.documents {
            println!("- {} (score: {:.4})", pipeline.assembler().label(doc), doc.score);
        }
    }

    let generation = pipeline.generate(&context).await.context("generation failed")?;
    println!("\nAnswer:\n");
    match generation {
        Generation::Complete(text) => println!("{}", text.trim()),
        Generation::Streamed(mut fragments) => {
            let mut stdout = std::io::stdout();
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment.context("generation failed mid-stream")?;
                stdout.write_all(fragment.as_bytes())?;
                stdout.flush()?;
            }
            println!();
        }
    }

    Ok(())
}
