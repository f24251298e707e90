#[cfg(feature = "candle")]
pub mod candle_pipeline;
pub mod error;
pub mod evaluate;
pub mod http_pipeline;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

#[cfg(feature = "candle")]
pub use candle_pipeline::CandlePipeline;
pub use error::{PasskeyError, PasskeyResult};
pub use evaluate::{extract_answer, query, Answer, MAX_NEW_TOKENS};
pub use http_pipeline::{HttpPipeline, HttpPipelineConfig};
pub use pipeline::{GenerationOptions, Pipeline, Pipelines, Precision};
pub use prompt::{Prompt, PromptGenerator, SuffixSlice};
pub use report::{accuracy, BenchReport, LengthTally};
pub use source::ModelSource;
