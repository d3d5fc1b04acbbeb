pub mod respondent;
pub mod survey;
pub mod template;
