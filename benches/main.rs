mod var_int;

fn main() {
    divan::main();
}
