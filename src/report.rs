//! Status reporting capability
//!
//! The reporting variant is selected at construction time: a single
//! declared jail reports itself, while the master-level reporter is
//! jail-aware and cross-checks the whole configuration against the live
//! table.

use crate::error::Result;
use crate::jail::Master;

/// Anything that can report status
pub trait Reporter {
    fn status(&mut self) -> Result<()>;
}

/// Reports one declared jail
pub struct JailReporter<'a> {
    master: &'a mut Master,
    name: String,
}

impl Reporter for JailReporter<'_> {
    fn status(&mut self) -> Result<()> {
        self.master.status(&self.name)
    }
}

/// Jail-aware master-level reporter
pub struct MasterReporter<'a> {
    master: &'a mut Master,
}

impl Reporter for MasterReporter<'_> {
    fn status(&mut self) -> Result<()> {
        self.master.status_all()
    }
}

/// Select the reporting variant for an optional jail name
pub fn reporter<'a>(master: &'a mut Master, jail: Option<&str>) -> Box<dyn Reporter + 'a> {
    match jail {
        Some(name) => Box::new(JailReporter {
            master,
            name: name.to_string(),
        }),
        None => Box::new(MasterReporter { master }),
    }
}
