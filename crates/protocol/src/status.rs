/// Meaning of a response status the caller did not list as acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// `308`: the upload is still incomplete.
    Incomplete,
    /// `200` / `201`: the whole object is already stored.
    AlreadyUploaded,
    /// `400`: the endpoint rejected the request.
    BadRequest,
    /// `404`: the upload URL does not exist (or expired).
    NotFound,
    /// `500` / `502` / `503` / `504`: transient server failure.
    ServerFailure,
    /// Any other status.
    Unrecognized,
}

impl ResponseKind {
    /// Classifies `status`.
    pub fn classify(status: u16) -> Self {
        match status {
            308 => Self::Incomplete,
            200 | 201 => Self::AlreadyUploaded,
            400 => Self::BadRequest,
            404 => Self::NotFound,
            500 | 502 | 503 | 504 => Self::ServerFailure,
            _ => Self::Unrecognized,
        }
    }

    /// Checks `status` against the statuses acceptable for one call.
    ///
    /// Returns `Ok(())` when allowed, otherwise the classification.
    pub fn check(status: u16, allowed: &[u16]) -> Result<(), Self> {
        if allowed.contains(&status) {
            Ok(())
        } else {
            Err(Self::classify(status))
        }
    }
}
