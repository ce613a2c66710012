//! Application use cases / business logic

pub mod pipeline;
pub mod write_recipe;

pub use pipeline::{
    KeyedGuard, KeyedLocks, PackageReport, Pipeline, PipelineConfig, PipelineError, RecipeOutcome, TaskReport,
};
pub use write_recipe::{WriteRecipeConfig, WriteRecipeError, WriteRecipeUseCase, WrittenRecipe};
