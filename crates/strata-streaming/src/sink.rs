use strata_sector::{Fidelity, SectorId};

use crate::payload::SectorGeometry;

/// Receives geometry as it becomes resident and is retired.
///
/// Both calls happen on the update loop, in completion order. A pair is
/// never consumed twice without a discard in between.
pub trait SectorGeometrySink {
    fn consume(&mut self, sector: SectorId, fidelity: Fidelity, geometry: SectorGeometry);

    fn discard(&mut self, sector: SectorId, fidelity: Fidelity);
}

/// Adapts a pair of closures into a [`SectorGeometrySink`].
pub struct CallbackSink<C, D> {
    consume: C,
    discard: D,
}

impl<C, D> CallbackSink<C, D>
where
    C: FnMut(SectorId, Fidelity, SectorGeometry),
    D: FnMut(SectorId, Fidelity),
{
    pub fn new(consume: C, discard: D) -> Self {
        Self { consume, discard }
    }
}

impl<C, D> SectorGeometrySink for CallbackSink<C, D>
where
    C: FnMut(SectorId, Fidelity, SectorGeometry),
    D: FnMut(SectorId, Fidelity),
{
    fn consume(&mut self, sector: SectorId, fidelity: Fidelity, geometry: SectorGeometry) {
        (self.consume)(sector, fidelity, geometry);
    }

    fn discard(&mut self, sector: SectorId, fidelity: Fidelity) {
        (self.discard)(sector, fidelity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callbacks_receive_calls() {
        let mut consumed = Vec::new();
        let mut discarded = Vec::new();
        {
            let mut sink = CallbackSink::new(
                |sector, fidelity, _geometry| consumed.push((sector, fidelity)),
                |sector, fidelity| discarded.push((sector, fidelity)),
            );
            sink.consume(SectorId(1), Fidelity::Simple, SectorGeometry::Simple { quads: Vec::new() });
            sink.discard(SectorId(1), Fidelity::Simple);
        }
        assert_eq!(consumed, vec![(SectorId(1), Fidelity::Simple)]);
        assert_eq!(discarded, consumed);
    }
}
