//! Visualization contract between experiment output and a plotting frontend
//!
//! Rendering is the frontend's business. This module only fixes the shape
//! of the exchange: a [`Plot`] knows how to open a [`DataReader`] on an
//! experiment's run directory and how to turn data into something drawn on
//! a [`Canvas`]. [`Visualizer`] owns one of each and drives refreshes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{ScanError, ScanResult};

/// Keyword arguments forwarded to [`DataReader::get`] (iteration, species, ...)
pub type ReaderArgs = BTreeMap<String, Value>;

/// Reads one dataset from an experiment's output
pub trait DataReader {
    type Data;

    fn get(&self, args: &ReaderArgs) -> ScanResult<Self::Data>;
}

/// Drawing surface supplied by the frontend
pub trait Canvas {
    /// Short description for diagnostics
    fn describe(&self) -> String {
        "canvas".to_string()
    }
}

/// One kind of plot (histogram, phase space, image, ...)
pub trait Plot {
    type Reader: DataReader;
    type Drawable;

    /// Open a reader on the directory above the simulation output
    fn create_reader(&self, run_dir: &Path) -> ScanResult<Self::Reader>;

    /// Draw `data` for the first time
    fn create_drawable(
        &self,
        canvas: &mut dyn Canvas,
        data: &<Self::Reader as DataReader>::Data,
    ) -> ScanResult<Self::Drawable>;

    /// Feed new `data` into an existing drawable
    fn update_drawable(
        &self,
        drawable: &mut Self::Drawable,
        data: &<Self::Reader as DataReader>::Data,
    ) -> ScanResult<()>;
}

/// A plot bound to a run directory and a canvas
pub struct Visualizer<P: Plot> {
    plot: P,
    run_dir: PathBuf,
    reader: P::Reader,
    canvas: Box<dyn Canvas>,
    drawable: Option<P::Drawable>,
}

impl<P: Plot> Visualizer<P> {
    /// Bind `plot` to `run_dir` and `canvas`; both must be present
    pub fn new(
        plot: P,
        run_dir: Option<&Path>,
        canvas: Option<Box<dyn Canvas>>,
    ) -> ScanResult<Self> {
        let run_dir = run_dir
            .ok_or_else(|| ScanError::Lookup("a run directory is required".into()))?
            .to_path_buf();
        let canvas = canvas.ok_or_else(|| ScanError::Lookup("a canvas is required".into()))?;
        let reader = plot.create_reader(&run_dir)?;

        Ok(Self {
            plot,
            run_dir,
            reader,
            canvas,
            drawable: None,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn drawable(&self) -> Option<&P::Drawable> {
        self.drawable.as_ref()
    }

    /// Fetch data once and draw it, creating the drawable on first use
    pub fn refresh(&mut self, args: &ReaderArgs) -> ScanResult<()> {
        let data = self.reader.get(args)?;
        match self.drawable.as_mut() {
            Some(drawable) => self.plot.update_drawable(drawable, &data)?,
            None => {
                let drawable = self.plot.create_drawable(self.canvas.as_mut(), &data)?;
                self.drawable = Some(drawable);
            }
        }
        tracing::debug!(
            "Refreshed plot for {} on {}",
            self.run_dir.display(),
            self.canvas.describe()
        );
        Ok(())
    }
}
