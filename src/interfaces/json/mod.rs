pub mod edit_script;
