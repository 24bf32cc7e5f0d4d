use fedfusion_common::{Capability, Endpoint};
use fedfusion_model::Modifiers;

/// The solution modifiers in the order in which they are evaluated.
#[derive(Clone, Copy, Debug)]
enum Stage {
    Filter,
    Projection,
    Distinct,
    Limit,
}

impl Stage {
    const ORDER: [Stage; 4] = [Stage::Filter, Stage::Projection, Stage::Distinct, Stage::Limit];

    fn capability(self) -> Capability {
        match self {
            Stage::Filter => Capability::Filter,
            Stage::Projection => Capability::Projection,
            Stage::Distinct => Capability::Distinct,
            Stage::Limit => Capability::Limit,
        }
    }

    fn is_present(self, modifiers: &Modifiers) -> bool {
        match self {
            Stage::Filter => !modifiers.filters().is_empty(),
            Stage::Projection => modifiers.projection().is_some(),
            Stage::Distinct => modifiers.is_distinct(),
            Stage::Limit => modifiers.limit().is_some(),
        }
    }

    fn copy(self, from: &Modifiers, to: Modifiers) -> Modifiers {
        match self {
            Stage::Filter => to.with_filters(from.filters().iter().cloned()),
            Stage::Projection => to.with_projection(from.projection().map(<[_]>::to_vec)),
            Stage::Distinct => to.with_distinct(from.is_distinct()),
            Stage::Limit => to.with_limit(from.limit()),
        }
    }
}

/// Splits `modifiers` into the part that `endpoint` evaluates and the part that must be
/// evaluated on the returned stream.
///
/// Modifiers are pushed down in evaluation order as long as the endpoint evaluates each of them
/// remotely. Everything from the first modifier it cannot evaluate onward stays local, since a
/// limit below a local filter would drop solutions. The optional flag is never pushed down.
pub fn split_modifiers(modifiers: &Modifiers, endpoint: &dyn Endpoint) -> (Modifiers, Modifiers) {
    let mut remote = Modifiers::new();
    let mut local = Modifiers::new();
    let mut pushing = true;
    for stage in Stage::ORDER {
        if !stage.is_present(modifiers) {
            continue;
        }
        pushing = pushing && endpoint.has_remote_capability(stage.capability());
        if pushing {
            remote = stage.copy(modifiers, remote);
        } else {
            local = stage.copy(modifiers, local);
        }
    }
    (remote, local)
}
