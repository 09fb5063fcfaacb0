//! Instrumentation seam (SPEC_FULL "Ambient stack — Instrumentation
//! seam"). Spec §9 flags that the source splits tile loops purely to
//! emit intermediate "check images"; this crate replaces that with an
//! observer callback invoked once per `DetectionPipeline` state
//! transition, so the parallel tile pass never has to be broken up to
//! make room for a snapshot.

use crate::grid::{Binary, Labels};

/// One named snapshot point (spec §6's check-image tags).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CheckImage {
    Thresholded,
    Eroded,
    OpenedAndLabeled,
    DthreshOnSky,
    DthreshOnDet,
    HolesFilled,
    Opened,
    PseudosForSn,
    TruePseudos,
    DetectionFinal,
    Dilated,
}

/// A borrowed view of the pipeline's working grids at a `CheckImage`
/// point. Exactly one of `binary`/`labels` is populated, matching
/// whichever grid the named snapshot represents.
pub struct Snapshot<'a> {
    pub tag: CheckImage,
    pub binary: Option<&'a Binary>,
    pub labels: Option<&'a Labels>,
}

/// Called once per `DetectionPipeline` state transition that has a
/// named check-image tag. The default no-op implementation ([`NullObserver`])
/// makes instrumentation free when unused.
pub trait Observer {
    fn on_snapshot(&mut self, snapshot: Snapshot<'_>);
}

/// The default `Observer`: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn on_snapshot(&mut self, _snapshot: Snapshot<'_>) {}
}
