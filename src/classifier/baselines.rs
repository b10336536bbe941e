//! Trivial baselines: a fixed class, or the previous row's label

use super::{Classifier, ClassifierCore, Params};
use crate::error::{Result, TrendlabError};
use crate::estimators::{AsPrevious, ModelHandle, SameClass};

/// Predicts the configured `class` (default 1) for every row
#[derive(Debug, Clone)]
pub struct AlwaysSameClass {
    core: ClassifierCore,
    class: u8,
}

impl AlwaysSameClass {
    pub const NAME: &'static str = "same class";

    pub fn new(params: Params) -> Result<Self> {
        params.warn_unknown(Self::NAME, &["class"]);
        let class = params.get_u64("class")?.unwrap_or(1);
        if class > 1 {
            return Err(TrendlabError::invalid_parameter("class", class, "expected 0 or 1"));
        }
        Ok(Self {
            core: ClassifierCore::new(Self::NAME, params),
            class: class as u8,
        })
    }

    pub fn class(&self) -> u8 {
        self.class
    }
}

impl Classifier for AlwaysSameClass {
    fn core(&self) -> &ClassifierCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClassifierCore {
        &mut self.core
    }

    fn new_handle(&self) -> Result<ModelHandle> {
        Ok(ModelHandle::SameClass(SameClass::new(self.class)?))
    }
}

/// Persistence baseline: repeats the label of the preceding row
#[derive(Debug, Clone)]
pub struct AlwaysAsPrevious {
    core: ClassifierCore,
}

impl AlwaysAsPrevious {
    pub const NAME: &'static str = "as previous";

    pub fn new(params: Params) -> Result<Self> {
        params.warn_unknown(Self::NAME, &[]);
        Ok(Self {
            core: ClassifierCore::new(Self::NAME, params),
        })
    }
}

impl Classifier for AlwaysAsPrevious {
    fn core(&self) -> &ClassifierCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ClassifierCore {
        &mut self.core
    }

    fn new_handle(&self) -> Result<ModelHandle> {
        Ok(ModelHandle::AsPrevious(AsPrevious))
    }
}
