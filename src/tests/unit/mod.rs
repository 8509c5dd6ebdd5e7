mod conditions;
mod engine;
