mod canvas_states;
mod variables;
