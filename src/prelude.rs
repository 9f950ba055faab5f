//! Convenience re-export of the pieces most callers need: `open`, its
//! option types, the URI and transport-parameter types, and the crate-wide
//! error.

pub use crate::backends::s3::types::{HeadObjectResult, Object, PutStreamResponse};
pub use crate::backends::s3::{S3Client, S3ClientOptions};
pub use crate::bucket_iter::{iter_bucket, BucketIter, BucketIterOptions};
pub use crate::credentials::{AccessKeyId, AccessKeySecret, Credentials};
pub use crate::backends::SeekableAsyncRead;
pub use crate::dispatch::{open, Direction, Mode, OpenInput, OpenOptions, Stream};
pub use crate::error::S3Error;
pub use crate::transport_params::TransportParams;
pub use crate::uri::Location;
pub use crate::Region;
