mod batch;
mod config;
mod context;
mod eval;
mod exif_reader;
mod mover;
mod paths;
mod printf;
mod report;
mod template;

pub use batch::{
    split_paths, BatchError, BatchOptions, BatchResult, BatchRunner, RenderedMove, Separator,
};
pub use config::{app_paths, load_config, parse_config, AppConfig, AppPaths};
pub use context::{current_working_dir, FileContext, MetadataError, StatInfo, TimestampInfo};
pub use exif_reader::ExifData;
pub use mover::{move_path, MoveError, MoveOutcome};
pub use report::{
    reporter_for, JsonReporter, OutputFormat, Reporter, SilentReporter, SkipReason,
    TextReporter,
};
pub use template::{
    compile_template, render_template, validate_template, Template, TemplateError,
};
