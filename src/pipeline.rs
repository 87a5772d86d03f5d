use tracing::info;

use crate::{
    club::Snapshot,
    clock, filter,
    portal::{self, PortalConfig},
    sink::Sink,
};

pub struct Component<T: ?Sized> {
    pub name: String,

    pub component: Box<T>,
}

pub struct Pipeline {
    pub portal: PortalConfig,

    pub timezone: String,

    /// `None` lets every record through, an empty list lets none through.
    /// Only ever set for the file sink.
    pub keywords: Option<Vec<String>>,

    pub sink: Component<dyn Sink>,
}

/// One fetch, filter and write pass. Clock and portal errors abort the run,
/// what the sink does with per-record failures is up to the sink.
pub fn run(pipeline: Pipeline) -> Result<(), Box<dyn std::error::Error>> {
    let taken_at = clock::now(&pipeline.timezone)?;

    let portal = &pipeline.portal;
    let clubs = portal::fetch(&portal.url, &portal.cookies, portal.timeout())?;
    info!(clubs = clubs.len(), "fetched club list");

    let clubs = match &pipeline.keywords {
        Some(keywords) => filter::filter(clubs, keywords),
        None => clubs,
    };

    let snapshot = Snapshot::new(taken_at, clubs);
    info!(
        sink = pipeline.sink.name.as_str(),
        clubs = snapshot.len(),
        "writing snapshot"
    );

    pipeline.sink.component.write(&snapshot)
}
