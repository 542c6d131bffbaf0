use strata_config::CoverageConfig;
use strata_coverage::{
    CoverageRenderer, GpuCoverageRenderer, GpuReadbackError, SoftwareCoverageRenderer,
};

/// Build the coverage renderer the config asks for. Falls back to the
/// software renderer when no GPU adapter is available.
pub fn select_coverage_renderer(
    config: &CoverageConfig,
) -> Result<Box<dyn CoverageRenderer>, GpuReadbackError> {
    let (width, height) = (config.render_width, config.render_height);
    if config.prefer_gpu {
        let gpu = strata_render::init_headless_blocking()
            .map_err(GpuReadbackError::from)
            .and_then(|context| GpuCoverageRenderer::from_context(&context, width, height));
        match gpu {
            Ok(renderer) => {
                tracing::info!(width, height, "using GPU coverage renderer");
                return Ok(Box::new(renderer));
            }
            Err(err) => {
                tracing::warn!(error = %err, "GPU coverage unavailable, using software renderer");
            }
        }
    }
    tracing::info!(width, height, "using software coverage renderer");
    Ok(Box::new(SoftwareCoverageRenderer::new(width, height)?))
}
