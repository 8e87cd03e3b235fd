pub mod diagnosis_types;
