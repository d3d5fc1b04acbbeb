pub mod dispatch;
pub mod respondents;
pub mod surveys;
pub mod templates;
