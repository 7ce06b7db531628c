use crate::Error;

/// Steps a path forward by one run.
pub trait Driver<P> {
    /// Execute the next run of `path`, returning every successor path.
    ///
    /// A path which forks returns more than one successor. A path which
    /// terminates returns none.
    fn step(&mut self, path: &P) -> Result<Vec<P>, Error>;
}

impl<P, F> Driver<P> for F
where
    F: FnMut(&P) -> Result<Vec<P>, Error>,
{
    fn step(&mut self, path: &P) -> Result<Vec<P>, Error> {
        self(path)
    }
}
