//! Process-wide Prometheus metrics recorder installation.

use metrics_exporter_prometheus::PrometheusBuilder;

/// Handle to the installed Prometheus recorder, used to render the current
/// snapshot as text for the HTTP facade's metrics surface.
#[derive(Clone)]
pub struct PrometheusHandle(metrics_exporter_prometheus::PrometheusHandle);

impl PrometheusHandle {
    /// Renders the current metrics snapshot in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.0.render()
    }
}

/// Installs the global Prometheus recorder. Every `storage_operations_total`
/// and `storage_operation_duration_ms` emission from
/// [`crate::storage::sqlite::record_operation_metrics`] flows through it.
///
/// # Errors
///
/// Returns [`crate::Error::Storage`] if a recorder is already installed for
/// this process.
pub fn install() -> crate::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| crate::Error::Storage {
            operation: "install_metrics_recorder".to_string(),
            cause: e.to_string(),
        })?;
    Ok(PrometheusHandle(handle))
}
