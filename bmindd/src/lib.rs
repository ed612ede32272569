//! Hosting daemon for the beacon-minder system: brings up the
//! beacon-gateway driver against the configured broker and parks until
//! asked to shut down

use bmind_driver::DriverError;

use thiserror::Error;

pub type BeaconMinderResult<T> = std::result::Result<T, BeaconMinderError>;

#[derive(Error, Debug)]
pub enum BeaconMinderError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Driver Error")]
    Driver(#[from] DriverError),
}
