use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// What part of a command run failed.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open the song catalog")]
    Catalog,
    #[display("could not set up storage")]
    Storage,
    #[display("no usable typesetting engine")]
    Engine,
    #[display("could not load the document template")]
    Template,
    #[display("build failed")]
    Build,
    #[display("could not write output")]
    Output,
}
