//! Aspect and entity names the store itself refers to.

pub const CORP_USER_ENTITY_NAME: &str = "corpuser";
pub const CORP_GROUP_ENTITY_NAME: &str = "corpGroup";
pub const DATASET_ENTITY_NAME: &str = "dataset";
pub const DATA_JOB_ENTITY_NAME: &str = "dataJob";
pub const DATA_PLATFORM_ENTITY_NAME: &str = "dataPlatform";
pub const ACCESS_TOKEN_ENTITY_NAME: &str = "dataHubAccessToken";
pub const INGESTION_SOURCE_ENTITY_NAME: &str = "dataHubIngestionSource";
pub const POLICY_ENTITY_NAME: &str = "dataHubPolicy";

pub const STATUS_ASPECT_NAME: &str = "status";
pub const BROWSE_PATHS_V2_ASPECT_NAME: &str = "browsePathsV2";
pub const OWNERSHIP_ASPECT_NAME: &str = "ownership";

pub const CORP_USER_KEY_ASPECT_NAME: &str = "corpUserKey";
pub const CORP_USER_INFO_ASPECT_NAME: &str = "corpUserInfo";
pub const CORP_USER_EDITABLE_INFO_ASPECT_NAME: &str = "corpUserEditableInfo";
pub const GROUP_MEMBERSHIP_ASPECT_NAME: &str = "groupMembership";

pub const CORP_GROUP_KEY_ASPECT_NAME: &str = "corpGroupKey";
pub const CORP_GROUP_INFO_ASPECT_NAME: &str = "corpGroupInfo";

pub const DATASET_KEY_ASPECT_NAME: &str = "datasetKey";
pub const DATASET_PROPERTIES_ASPECT_NAME: &str = "datasetProperties";
pub const UPSTREAM_LINEAGE_ASPECT_NAME: &str = "upstreamLineage";
pub const DATASET_PROFILE_ASPECT_NAME: &str = "datasetProfile";

pub const DATA_JOB_KEY_ASPECT_NAME: &str = "dataJobKey";
pub const DATA_JOB_INFO_ASPECT_NAME: &str = "dataJobInfo";
pub const DATA_JOB_INPUT_OUTPUT_ASPECT_NAME: &str = "dataJobInputOutput";

pub const DATA_PLATFORM_KEY_ASPECT_NAME: &str = "dataPlatformKey";
pub const DATA_PLATFORM_INFO_ASPECT_NAME: &str = "dataPlatformInfo";

pub const ACCESS_TOKEN_KEY_ASPECT_NAME: &str = "dataHubAccessTokenKey";
pub const ACCESS_TOKEN_INFO_ASPECT_NAME: &str = "dataHubAccessTokenInfo";

pub const INGESTION_SOURCE_KEY_ASPECT_NAME: &str = "dataHubIngestionSourceKey";
pub const INGESTION_INFO_ASPECT_NAME: &str = "dataHubIngestionSourceInfo";

pub const DATAHUB_POLICY_KEY_ASPECT_NAME: &str = "dataHubPolicyKey";
pub const DATAHUB_POLICY_INFO_ASPECT_NAME: &str = "dataHubPolicyInfo";
