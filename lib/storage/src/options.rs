use fedfusion_common::Capability;
use std::time::Duration;

/// A failure a [MemSource](crate::MemSource) simulates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Fault {
    #[default]
    None,
    /// Every request fails immediately.
    FailRequests,
    /// Streams fail after producing the given number of solutions.
    FailAfter(usize),
}

/// Configures how a [MemSource](crate::MemSource) presents itself to the federation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemSourceOptions {
    capabilities: Vec<Capability>,
    remote_capabilities: Vec<Capability>,
    exclusive_groups: bool,
    required_subjects: bool,
    sub_plans: bool,
    fault: Fault,
    index_delay: Option<Duration>,
}

impl Default for MemSourceOptions {
    fn default() -> Self {
        Self {
            capabilities: Capability::ALL.to_vec(),
            remote_capabilities: Capability::ALL.to_vec(),
            exclusive_groups: false,
            required_subjects: false,
            sub_plans: false,
            fault: Fault::None,
            index_delay: None,
        }
    }
}

impl MemSourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capabilities the source evaluates itself. Capabilities missing here are
    /// evaluated by the executor.
    #[must_use]
    pub fn with_remote_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.remote_capabilities = capabilities.to_vec();
        self
    }

    /// Sets the capabilities the source supports at all.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    /// Reports connected relevant triples as exclusive groups instead of single triples.
    #[must_use]
    pub fn with_exclusive_groups(mut self, exclusive_groups: bool) -> Self {
        self.exclusive_groups = exclusive_groups;
        self
    }

    /// Makes the source behave like a lookup service: a fragment whose subject is a variable
    /// requires that variable as an input.
    #[must_use]
    pub fn with_required_subjects(mut self, required_subjects: bool) -> Self {
        self.required_subjects = required_subjects;
        self
    }

    /// Lets the source evaluate joins and cartesian products over its own fragments.
    #[must_use]
    pub fn with_sub_plans(mut self, sub_plans: bool) -> Self {
        self.sub_plans = sub_plans;
        self
    }

    #[must_use]
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }

    /// Delays building the index in the background, which keeps the source uninitialized for
    /// at least `delay`.
    #[must_use]
    pub fn with_index_delay(mut self, delay: Duration) -> Self {
        self.index_delay = Some(delay);
        self
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn has_remote_capability(&self, capability: Capability) -> bool {
        self.has_capability(capability) && self.remote_capabilities.contains(&capability)
    }

    pub fn exclusive_groups(&self) -> bool {
        self.exclusive_groups
    }

    pub fn required_subjects(&self) -> bool {
        self.required_subjects
    }

    pub fn sub_plans(&self) -> bool {
        self.sub_plans
    }

    pub fn fault(&self) -> Fault {
        self.fault
    }

    pub fn index_delay(&self) -> Option<Duration> {
        self.index_delay
    }
}
