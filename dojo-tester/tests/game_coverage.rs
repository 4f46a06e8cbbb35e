#[path = "../../dojo-game/tests/data_shapes.rs"]
mod data_shapes;

#[path = "../../dojo-game/tests/scenarios.rs"]
mod scenarios;
