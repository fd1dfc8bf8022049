use async_trait::async_trait;
use thiserror::Error;

/// Error returned by the identity center API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SsoApiError {
    /// A write conflicted with a very recent write to the same assignment.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

/// Identity store user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoUser {
    /// Identity store user ID.
    pub id: String,
    /// User name, usually the email address.
    pub user_name: String,
}

/// Member account of the organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoAccount {
    /// Account ID.
    pub id: String,
    /// Account name.
    pub name: String,
}

/// Permission set details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSet {
    /// Permission set ARN.
    pub arn: String,
    /// Permission set name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
}

/// Assignment of a permission set in one account to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountAssignment {
    /// Identity center instance ARN.
    pub instance_arn: String,
    /// Permission set ARN.
    pub permission_set_arn: String,
    /// Target account ID.
    pub account_id: String,
    /// Identity store user ID.
    pub principal_id: String,
}

/// Status of an asynchronous assignment operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentStatus {
    /// Still being applied.
    InProgress,
    /// Applied.
    Succeeded,
    /// Rejected with a reason.
    Failed(String),
}

/// Handle of an asynchronous assignment creation or deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentOperation {
    /// Request ID to poll.
    pub request_id: String,
    /// Current status.
    pub status: AssignmentStatus,
}

/// Port over the eventually consistent identity center API.
#[async_trait]
pub trait IdentityCenterApi: Send + Sync {
    /// Finds a user by user name.
    async fn find_user(
        &self,
        identity_store_id: &str,
        user_name: &str,
    ) -> Result<Option<SsoUser>, SsoApiError>;

    /// Lists organization accounts.
    async fn list_accounts(&self) -> Result<Vec<SsoAccount>, SsoApiError>;

    /// Lists permission set ARNs of an instance.
    async fn list_permission_sets(&self, instance_arn: &str) -> Result<Vec<String>, SsoApiError>;

    /// Describes one permission set.
    async fn describe_permission_set(
        &self,
        instance_arn: &str,
        permission_set_arn: &str,
    ) -> Result<PermissionSet, SsoApiError>;

    /// Starts creating an assignment.
    async fn create_account_assignment(
        &self,
        assignment: &AccountAssignment,
    ) -> Result<AssignmentOperation, SsoApiError>;

    /// Reads the status of an assignment creation.
    async fn describe_assignment_creation(
        &self,
        instance_arn: &str,
        request_id: &str,
    ) -> Result<AssignmentOperation, SsoApiError>;

    /// Starts deleting an assignment.
    async fn delete_account_assignment(
        &self,
        assignment: &AccountAssignment,
    ) -> Result<AssignmentOperation, SsoApiError>;

    /// Reads the status of an assignment deletion.
    async fn describe_assignment_deletion(
        &self,
        instance_arn: &str,
        request_id: &str,
    ) -> Result<AssignmentOperation, SsoApiError>;
}
