//! Python bindings, built with the `python` feature.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::config::Config;
use crate::demux::{Demuxer as Inner, Grammar};
use crate::repair::RepairEngine;
use crate::types::FileEvent;

fn event_dict<'py>(py: Python<'py>, ev: &FileEvent) -> PyResult<&'py PyDict> {
    let d = PyDict::new(py);
    match ev {
        FileEvent::Started { path, name } => {
            d.set_item("event", "file-started")?;
            d.set_item("path", path)?;
            d.set_item("name", name)?;
        }
        FileEvent::Chunk { path, text } => {
            d.set_item("event", "file-chunk")?;
            d.set_item("path", path)?;
            d.set_item("text", text)?;
        }
        FileEvent::Completed {
            path,
            content,
            truncated,
        } => {
            d.set_item("event", "file-completed")?;
            d.set_item("path", path)?;
            d.set_item("content", content)?;
            d.set_item("truncated", *truncated)?;
        }
    }
    Ok(d)
}

/// Incremental file demuxer over streamed model output.
#[pyclass(name = "Demuxer")]
struct PyDemuxer {
    inner: Inner,
}

#[pymethods]
impl PyDemuxer {
    #[new]
    #[pyo3(signature = (extensions = None, loose = false))]
    fn new(extensions: Option<Vec<String>>, loose: bool) -> Self {
        let extensions = extensions.unwrap_or_else(|| Config::default().allowed_extensions);
        let grammar = if loose { Grammar::Loose } else { Grammar::Strict };
        Self {
            inner: Inner::new(&extensions, grammar),
        }
    }

    /// Push one delta, returning the events it produced as dicts.
    #[pyo3(text_signature = "($self, delta)")]
    fn feed<'py>(&mut self, py: Python<'py>, delta: &str) -> PyResult<Vec<&'py PyDict>> {
        self.inner
            .push(delta)
            .iter()
            .map(|ev| event_dict(py, ev))
            .collect()
    }

    #[pyo3(text_signature = "($self)")]
    fn finish<'py>(&mut self, py: Python<'py>) -> PyResult<Vec<&'py PyDict>> {
        self.inner
            .finish()
            .iter()
            .map(|ev| event_dict(py, ev))
            .collect()
    }

    #[getter]
    fn current_path(&self) -> Option<String> {
        self.inner.current_path().map(str::to_string)
    }
}

/// Repair one file. Returns `(content, diagnostics_json)`.
#[pyfunction]
#[pyo3(text_signature = "(path, content)")]
fn validate(path: &str, content: &str) -> PyResult<(String, String)> {
    let v = RepairEngine::default().validate(path, content);
    let diagnostics = serde_json::to_string(&v.diagnostics)
        .map_err(|e| PyValueError::new_err(format!("cannot encode diagnostics: {e}")))?;
    Ok((v.content, diagnostics))
}

#[pymodule]
fn stitch(_py: Python, m: &PyModule) -> PyResult<()> {
    crate::logging::init_logging();
    m.add_class::<PyDemuxer>()?;
    m.add_function(wrap_pyfunction!(validate, m)?)?;
    Ok(())
}
