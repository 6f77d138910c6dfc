//! Access-control and encryption settings applied to every object write.

use std::{fmt, str::FromStr};

/// Canned access-control policy attached to uploaded objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CannedAcl {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    AwsExecRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
    LogDeliveryWrite,
}

impl CannedAcl {
    /// Wire name understood by the object store (`x-amz-acl`).
    pub fn as_str(&self) -> &'static str {
        match self {
            CannedAcl::Private => "private",
            CannedAcl::PublicRead => "public-read",
            CannedAcl::PublicReadWrite => "public-read-write",
            CannedAcl::AuthenticatedRead => "authenticated-read",
            CannedAcl::AwsExecRead => "aws-exec-read",
            CannedAcl::BucketOwnerRead => "bucket-owner-read",
            CannedAcl::BucketOwnerFullControl => "bucket-owner-full-control",
            CannedAcl::LogDeliveryWrite => "log-delivery-write",
        }
    }
}

impl FromStr for CannedAcl {
    type Err = String;

    /// Case-insensitive; accepts the wire names as well as `_` in place of `-`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        let acl = match normalized.as_str() {
            "private" => CannedAcl::Private,
            "public-read" => CannedAcl::PublicRead,
            "public-read-write" => CannedAcl::PublicReadWrite,
            "authenticated-read" => CannedAcl::AuthenticatedRead,
            "aws-exec-read" => CannedAcl::AwsExecRead,
            "bucket-owner-read" => CannedAcl::BucketOwnerRead,
            "bucket-owner-full-control" => CannedAcl::BucketOwnerFullControl,
            "log-delivery-write" => CannedAcl::LogDeliveryWrite,
            _ => return Err(format!("`{}` is not a canned ACL", value)),
        };
        Ok(acl)
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side encryption requested on write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ServerSideEncryption {
    #[default]
    None,
    Aes256,
    AwsKms,
}

impl ServerSideEncryption {
    /// Header value for `x-amz-server-side-encryption`, if any.
    pub fn as_header_value(&self) -> Option<&'static str> {
        match self {
            ServerSideEncryption::None => None,
            ServerSideEncryption::Aes256 => Some("AES256"),
            ServerSideEncryption::AwsKms => Some("aws:kms"),
        }
    }
}

impl FromStr for ServerSideEncryption {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(ServerSideEncryption::None),
            "aes256" => Ok(ServerSideEncryption::Aes256),
            "aws:kms" | "kms" => Ok(ServerSideEncryption::AwsKms),
            _ => Err(format!("`{}` is not a supported encryption method", value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canned_acl_names_leniently() {
        assert_eq!("public-read".parse::<CannedAcl>(), Ok(CannedAcl::PublicRead));
        assert_eq!("Public_Read".parse::<CannedAcl>(), Ok(CannedAcl::PublicRead));
        assert_eq!(
            "bucket-owner-full-control".parse::<CannedAcl>(),
            Ok(CannedAcl::BucketOwnerFullControl)
        );
        assert!("world-writable".parse::<CannedAcl>().is_err());
    }

    #[test]
    fn empty_encryption_means_none() {
        assert_eq!("".parse(), Ok(ServerSideEncryption::None));
        assert_eq!("AES256".parse(), Ok(ServerSideEncryption::Aes256));
        assert_eq!(ServerSideEncryption::AwsKms.as_header_value(), Some("aws:kms"));
        assert!("rot13".parse::<ServerSideEncryption>().is_err());
    }
}
