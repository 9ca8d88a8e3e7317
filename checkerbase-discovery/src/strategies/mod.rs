mod directory;
mod mx;
mod probe;
mod well_known;

pub use directory::DirectoryLookupStrategy;
pub use mx::MxProviderStrategy;
pub use probe::ProbeStrategy;
pub use well_known::WellKnownUrlsStrategy;
