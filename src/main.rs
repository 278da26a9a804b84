fn main() {
    if let Err(err) = todo_board_lib::run() {
        eprintln!("todo-board: {err}");
        std::process::exit(1);
    }
}
