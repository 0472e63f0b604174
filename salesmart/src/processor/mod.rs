pub mod aggregate;
pub mod curate;
pub mod loader;
pub mod normalize;
pub mod persist;
pub mod publish;
pub mod udf;
pub mod validation;

pub use aggregate::Aggregator;
pub use curate::{Curation, CurationCounts, FactCurator};
pub use loader::{Loader, StagedTables};
pub use normalize::{Dimension, Dimensions, Normalizer};
pub use persist::StagingWriter;
pub use publish::{PublishResult, SinkPublisher};
pub use udf::register_udfs;
pub use validation::{CheckResult, DataValidator, ValidationPolicy, Verdict, known_checks};

use crate::storage::SourceStore;
use common::Result;
use common::config::Settings;
use datafusion::execution::context::SessionContext;
use datafusion::prelude::SessionConfig;
use std::sync::Arc;

/// Session shared by every stage of one run.
///
/// A single target partition keeps scans, joins and float sums in a fixed
/// order, so two runs over the same input produce identical output.
pub fn session_context(settings: &Settings) -> Result<Arc<SessionContext>> {
    let ctx = SessionContext::new_with_config(SessionConfig::new().with_target_partitions(1));
    register_udfs(&ctx, settings.aggregation.week_convention)?;
    Ok(Arc::new(ctx))
}

/// The read-side stages of a run over one session. Sink writes (staging and
/// publishing) are kept apart so validation-only runs never touch the sink.
pub struct SalesMartProcessor {
    pub ctx: Arc<SessionContext>,
    pub loader: Loader,
    pub validator: DataValidator,
    pub normalizer: Normalizer,
    pub curator: FactCurator,
    pub aggregator: Aggregator,
}

impl SalesMartProcessor {
    pub fn new(settings: &Settings, source: Arc<dyn SourceStore>) -> Result<Self> {
        let ctx = session_context(settings)?;

        Ok(Self {
            loader: Loader::new(source),
            validator: DataValidator::new(ctx.clone()),
            normalizer: Normalizer::new(ctx.clone(), settings.normalization.on_conflict),
            curator: FactCurator::new(ctx.clone()),
            aggregator: Aggregator::new(ctx.clone()),
            ctx,
        })
    }
}
