//! Response models of the web-service functions the services call.
//!
//! Only the fields the controllers read are named; everything else the site
//! sends is kept in `extra` so cached answers and CLI output stay complete.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Plan status the site uses for a completed learning plan
pub const PLAN_STATUS_COMPLETE: i64 = 2;

/// Learning plan as listed for a user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningPlan {
  pub id: i64,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub userid: i64,
  #[serde(default)]
  pub status: i64,
  #[serde(default)]
  pub statusname: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// `core_competency_list_user_plans` answers with a bare list; newer sites
/// wrap it in an object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanList {
  Bare(Vec<LearningPlan>),
  Wrapped {
    #[serde(default)]
    plans: Vec<LearningPlan>,
  },
}

impl PlanList {
  pub fn into_plans(self) -> Vec<LearningPlan> {
    match self {
      PlanList::Bare(plans) => plans,
      PlanList::Wrapped { plans } => plans,
    }
  }
}

/// Competency definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Competency {
  pub id: i64,
  #[serde(default)]
  pub shortname: String,
  #[serde(default)]
  pub idnumber: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// One row of a plan or course competency list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompetencyEntry {
  #[serde(default)]
  pub competency: Competency,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// `tool_lp_data_for_plan_page`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanPage {
  pub plan: LearningPlan,
  #[serde(default)]
  pub competencies: Vec<CompetencyEntry>,
  #[serde(default)]
  pub competencycount: i64,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseStatistics {
  #[serde(default)]
  pub competencycount: i64,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// `tool_lp_data_for_course_competencies_page`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseCompetenciesPage {
  pub courseid: i64,
  #[serde(default)]
  pub competencies: Vec<CompetencyEntry>,
  #[serde(default)]
  pub statistics: CourseStatistics,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// User shown in a competency summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryUser {
  pub id: i64,
  #[serde(default)]
  pub fullname: String,
  #[serde(default)]
  pub profileimageurl: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// A user's rating of one competency, in a plan or a course
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserCompetency {
  #[serde(default)]
  pub id: i64,
  #[serde(default)]
  pub status: i64,
  #[serde(default)]
  pub statusname: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserCompetencySummary {
  pub user: SummaryUser,
  #[serde(default)]
  pub usercompetency: Option<UserCompetency>,
  #[serde(default)]
  pub usercompetencyplan: Option<UserCompetency>,
  #[serde(default)]
  pub usercompetencycourse: Option<UserCompetency>,
  #[serde(default)]
  pub evidence: Vec<Value>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// `tool_lp_data_for_user_competency_summary_in_plan`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompetencyInPlan {
  pub usercompetencysummary: UserCompetencySummary,
  pub plan: LearningPlan,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseModule {
  pub id: i64,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub url: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// `tool_lp_data_for_user_competency_summary_in_course`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompetencyInCourse {
  pub usercompetencysummary: UserCompetencySummary,
  #[serde(default)]
  pub coursemodules: Vec<CourseModule>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Certificate activity settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Certificate {
  pub id: i64,
  pub coursemodule: i64,
  #[serde(default)]
  pub course: i64,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub intro: String,
  /// Present only while the user has not spent the required time in the course
  #[serde(default, deserialize_with = "deserialize_flag")]
  pub requiredtimenotmet: bool,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateList {
  #[serde(default)]
  pub certificates: Vec<Certificate>,
}

/// One issued copy of a certificate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuedCertificate {
  pub id: i64,
  #[serde(default)]
  pub timecreated: i64,
  pub fileurl: String,
  #[serde(default)]
  pub filename: String,
  #[serde(default)]
  pub code: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// `mod_certificate_get_issued_certificates`; `issues` is missing when the
/// user has none.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuedCertificates {
  #[serde(default)]
  pub issues: Option<Vec<IssuedCertificate>>,
}

/// `mod_certificate_issue_certificate`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueResponse {
  #[serde(default)]
  pub issue: Option<IssuedCertificate>,
}

/// Answer of log-style writes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WriteStatus {
  #[serde(default)]
  pub status: bool,
  #[serde(default)]
  pub warnings: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
  pub id: i64,
  #[serde(default)]
  pub fullname: String,
  #[serde(default)]
  pub profileimageurl: Option<String>,
}

/// Accept `true`/`false`, `0`/`1` and `null` for a boolean flag.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<Value>::deserialize(deserializer)?;
  Ok(match value {
    Some(Value::Bool(b)) => b,
    Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
    Some(Value::String(s)) => !(s.is_empty() || s == "0"),
    _ => false,
  })
}
