use crate::{classifier, fetcher, filter, prober};

/// Settings for a whole run, one section per stage.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub fetcher: fetcher::Config,
    pub filter: filter::Config,
    pub prober: prober::Config,
    pub classifier: classifier::Config,
}
