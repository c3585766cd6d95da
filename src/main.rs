fn main() {
    detox_lib::run()
}
