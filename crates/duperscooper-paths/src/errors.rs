use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(
        "could not determine the project directory; the system does not provide a usable home/config path"
    )]
    NoHome,

    #[error(transparent)]
    Io(#[from] io::Error),
}
